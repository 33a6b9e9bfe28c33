//! Edge cache tier
//!
//! Short-TTL in-process cache keyed by the URL form of the fingerprint,
//! for request-locality wins. No coalescing here; that belongs to the
//! unified service.

use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct EdgeEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl EdgeEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// In-process edge cache
pub struct EdgeCache {
    entries: Mutex<HashMap<String, EdgeEntry>>,
    default_ttl: Duration,
}

/// Prune the expired backlog once the map grows past this
const PRUNE_THRESHOLD: usize = 4096;

impl EdgeCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a value; returns the value and its age on hit.
    pub async fn get(&self, key: &str) -> Option<(Value, Duration)> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                Some((entry.value.clone(), now.duration_since(entry.inserted_at)))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value with an explicit TTL
    pub async fn put(&self, key: &str, value: Value, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries.len() >= PRUNE_THRESHOLD {
            entries.retain(|_, e| !e.is_expired(now));
        }

        entries.insert(
            key.to_string(),
            EdgeEntry {
                value,
                inserted_at: now,
                ttl,
            },
        );
    }

    pub async fn delete(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_put_round_trip() {
        let cache = EdgeCache::new(Duration::from_secs(120));
        cache
            .put("k", json!({"title": "Dune"}), Duration::from_secs(60))
            .await;

        let (value, age) = cache.get("k").await.unwrap();
        assert_eq!(value, json!({"title": "Dune"}));
        assert!(age < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let cache = EdgeCache::new(Duration::from_secs(120));
        cache.put("k", json!(1), Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.is_none());
        // Lazy removal on read
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = EdgeCache::new(Duration::from_secs(120));
        cache.put("k", json!(1), Duration::from_secs(60)).await;
        cache.delete("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_sequential_reads_stay_hits_within_ttl() {
        let cache = EdgeCache::new(Duration::from_secs(120));
        cache.put("k", json!("v"), Duration::from_secs(60)).await;
        assert!(cache.get("k").await.is_some());
        assert!(cache.get("k").await.is_some());
    }
}
