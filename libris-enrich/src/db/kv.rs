//! Durable key/value cache rows
//!
//! Raw SQL for the kv_cache table. TTL policy and fail-open semantics
//! live in the cache tier; this module only reads and writes rows.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// One cache row with its metadata
#[derive(Debug, Clone)]
pub struct KvRow {
    pub value: String,
    pub source: Option<String>,
    pub quality_score: Option<i64>,
    pub inserted_at: DateTime<Utc>,
    pub ttl_seconds: i64,
}

impl KvRow {
    /// Age of the entry in seconds at `now`
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.inserted_at).num_seconds()
    }

    /// Remaining TTL in seconds; zero when expired
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> i64 {
        (self.ttl_seconds - self.age_seconds(now)).max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age_seconds(now) >= self.ttl_seconds
    }
}

/// Fetch a row. Expired rows are deleted on the way out and reported
/// as a miss.
pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<KvRow>> {
    let row = sqlx::query(
        r#"
        SELECT value, source, quality_score, inserted_at, ttl_seconds
        FROM kv_cache
        WHERE key = ?
        "#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let inserted_at: String = row.get("inserted_at");
    let inserted_at = chrono::DateTime::parse_from_rfc3339(&inserted_at)?.with_timezone(&Utc);

    let entry = KvRow {
        value: row.get("value"),
        source: row.get("source"),
        quality_score: row.get("quality_score"),
        inserted_at,
        ttl_seconds: row.get("ttl_seconds"),
    };

    if entry.is_expired(Utc::now()) {
        delete(pool, key).await?;
        return Ok(None);
    }

    Ok(Some(entry))
}

/// Upsert a row
pub async fn put(
    pool: &SqlitePool,
    key: &str,
    namespace: &str,
    value: &str,
    source: Option<&str>,
    quality_score: Option<i64>,
    ttl_seconds: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO kv_cache (key, namespace, value, source, quality_score, inserted_at, ttl_seconds)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            namespace = excluded.namespace,
            value = excluded.value,
            source = excluded.source,
            quality_score = excluded.quality_score,
            inserted_at = excluded.inserted_at,
            ttl_seconds = excluded.ttl_seconds
        "#,
    )
    .bind(key)
    .bind(namespace)
    .bind(value)
    .bind(source)
    .bind(quality_score)
    .bind(Utc::now().to_rfc3339())
    .bind(ttl_seconds)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a row
pub async fn delete(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM kv_cache WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Drop every expired row; returns how many were removed.
///
/// Called by the periodic sweep, not on the request path.
pub async fn sweep_expired(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM kv_cache
        WHERE CAST(strftime('%s', 'now') AS INTEGER)
              - CAST(strftime('%s', inserted_at) AS INTEGER) >= ttl_seconds
        "#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
