//! Durable KV cache tier
//!
//! SQLite-backed tier with per-kind TTL policy and provider metadata.
//! Every operation here is fail-open: a storage error is logged and
//! reported as a miss (reads) or swallowed (writes) so the request path
//! can always fall through to origin.

use crate::db;
use serde_json::Value;
use sqlx::SqlitePool;
use std::time::Duration;

/// A KV tier hit with its metadata
#[derive(Debug, Clone)]
pub struct KvHit {
    pub value: Value,
    pub source: Option<String>,
    pub quality_score: Option<i64>,
    pub age_seconds: i64,
    pub remaining_ttl: i64,
}

/// Durable cache tier over the shared database
#[derive(Clone)]
pub struct KvCache {
    pool: SqlitePool,
}

impl KvCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Probe the tier. Errors and expired entries read as a miss.
    pub async fn get(&self, key: &str) -> Option<KvHit> {
        let row = match db::kv::get(&self.pool, key).await {
            Ok(row) => row?,
            Err(e) => {
                tracing::warn!(key, error = %e, "KV cache read failed (fail-open)");
                return None;
            }
        };

        let value = match serde_json::from_str(&row.value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "KV cache entry is not valid JSON, dropping");
                let _ = db::kv::delete(&self.pool, key).await;
                return None;
            }
        };

        let now = chrono::Utc::now();
        Some(KvHit {
            value,
            source: row.source.clone(),
            quality_score: row.quality_score,
            age_seconds: row.age_seconds(now),
            remaining_ttl: row.remaining_ttl(now),
        })
    }

    /// Write an entry. A failed write never fails the caller.
    pub async fn put(
        &self,
        key: &str,
        namespace: &str,
        value: &Value,
        source: Option<&str>,
        quality_score: Option<i64>,
        ttl: Duration,
    ) {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(key, error = %e, "KV cache value not serializable, skipping write");
                return;
            }
        };

        if let Err(e) = db::kv::put(
            &self.pool,
            key,
            namespace,
            &serialized,
            source,
            quality_score,
            ttl.as_secs() as i64,
        )
        .await
        {
            tracing::warn!(key, error = %e, "KV cache write failed (fail-open)");
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(e) = db::kv::delete(&self.pool, key).await {
            tracing::warn!(key, error = %e, "KV cache delete failed (fail-open)");
        }
    }

    /// Remove expired rows. Spawned periodically from main, never on the
    /// request path.
    pub async fn sweep(&self) {
        match db::kv::sweep_expired(&self.pool).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "KV cache sweep removed expired entries"),
            Err(e) => tracing::warn!(error = %e, "KV cache sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_with_metadata() {
        let pool = init_memory_pool().await.unwrap();
        let kv = KvCache::new(pool);

        kv.put(
            "v1:search:isbn:isbn=9780439708180",
            "search",
            &json!({"title": "Cached Book"}),
            Some("openlibrary"),
            Some(85),
            Duration::from_secs(500),
        )
        .await;

        let hit = kv.get("v1:search:isbn:isbn=9780439708180").await.unwrap();
        assert_eq!(hit.value["title"], "Cached Book");
        assert_eq!(hit.source.as_deref(), Some("openlibrary"));
        assert_eq!(hit.quality_score, Some(85));
        assert!(hit.remaining_ttl <= 500 && hit.remaining_ttl > 490);
    }

    #[tokio::test]
    async fn test_miss_on_unknown_key() {
        let pool = init_memory_pool().await.unwrap();
        let kv = KvCache::new(pool);
        assert!(kv.get("absent").await.is_none());
    }

    #[tokio::test]
    async fn test_read_fails_open_when_pool_closed() {
        let pool = init_memory_pool().await.unwrap();
        let kv = KvCache::new(pool.clone());
        pool.close().await;

        // Both operations must be silent no-ops
        kv.put("k", "search", &json!(1), None, None, Duration::from_secs(60))
            .await;
        assert!(kv.get("k").await.is_none());
    }
}
