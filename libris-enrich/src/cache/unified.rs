//! Unified cache service
//!
//! Two-tier read-through with single-flight coalescing. Probe order is
//! Edge, then KV (repopulating Edge best-effort), then a coalesced
//! loader call. At most one loader runs per fingerprint at any moment;
//! concurrent missers share its outcome over a broadcast channel.

use crate::cache::edge::EdgeCache;
use crate::cache::fingerprint::{edge_url, fingerprint, QueryKind};
use crate::cache::kv::KvCache;
use crate::config::CacheSettings;
use crate::metrics::{MetricEvent, MetricsSink};
use libris_common::envelope::CacheSource;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::broadcast;

/// Marker stored for negatively cached hard not-found outcomes
const NEGATIVE_MARKER: &str = "__not_found__";

/// Successful loader output
#[derive(Debug, Clone)]
pub struct LoadedValue {
    pub value: Value,
    /// Provider name or "orchestrated"
    pub source: String,
    pub quality_score: u8,
}

/// Loader failure, shared verbatim with every coalesced waiter
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("deadline exceeded: {0}")]
    Deadline(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl From<LoadError> for libris_common::Error {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound(msg) => libris_common::Error::NotFound(msg),
            LoadError::Deadline(msg) => libris_common::Error::DeadlineExceeded(msg),
            LoadError::Upstream(msg) => libris_common::Error::Provider(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// What a unified-cache read observed, alongside the value
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub value: Value,
    pub status: CacheStatus,
    pub tier: CacheSource,
    /// Provider name or "orchestrated"
    pub source: String,
    /// Policy TTL for the query kind, in seconds
    pub ttl_seconds: u64,
    pub completeness_percent: u8,
    pub image_quality: &'static str,
    pub elapsed_ms: u64,
    /// True when this caller shared another caller's loader
    pub coalesced: bool,
}

type SharedOutcome = Result<LoadedValue, LoadError>;

enum GroupRole {
    Leader(broadcast::Sender<SharedOutcome>),
    Follower(broadcast::Receiver<SharedOutcome>),
}

/// Two-tier read-through cache with request coalescing
///
/// The coalescer map is guarded by a synchronous mutex: every access is
/// short and lock-free of awaits, and a leader whose future is dropped
/// mid-flight must be able to clean up from a Drop impl.
pub struct UnifiedCache {
    edge: EdgeCache,
    kv: KvCache,
    settings: CacheSettings,
    coalescer: Mutex<HashMap<String, broadcast::Sender<SharedOutcome>>>,
    metrics: MetricsSink,
}

/// Removes a leader's coalescing group if the leader never completed.
/// Dropping the map entry drops the sender, so waiting followers
/// observe a closed channel instead of hanging.
struct GroupGuard<'a> {
    groups: &'a Mutex<HashMap<String, broadcast::Sender<SharedOutcome>>>,
    key: Option<String>,
}

impl GroupGuard<'_> {
    fn disarm(&mut self) {
        self.key = None;
    }
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut groups) = self.groups.lock() {
                groups.remove(&key);
            }
        }
    }
}

impl UnifiedCache {
    pub fn new(
        edge: EdgeCache,
        kv: KvCache,
        settings: CacheSettings,
        metrics: MetricsSink,
    ) -> Self {
        Self {
            edge,
            kv,
            settings,
            coalescer: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Read through both tiers, calling `loader` on a full miss.
    ///
    /// Concurrent callers with an identical fingerprint join one
    /// coalescing group: only the first runs the loader, the rest wait
    /// on the shared outcome.
    pub async fn get_or_load<F, Fut>(
        &self,
        kind: QueryKind,
        params: &[(&str, &str)],
        loader: F,
    ) -> Result<CacheOutcome, LoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LoadedValue, LoadError>>,
    {
        let started = Instant::now();
        let key = fingerprint(kind, params);
        let edge_key = edge_url(&key);
        let policy_ttl = kind.ttl(&self.settings).as_secs();

        // Tier 1: edge
        if let Some((wrapped, _age)) = self.edge.get(&edge_key).await {
            let (value, source) = unwrap_edge_entry(wrapped);
            self.metrics.emit(MetricEvent::CacheHit {
                kind: kind.kind(),
                tier: "EDGE",
            });
            return Ok(self.outcome(
                value,
                CacheStatus::Hit,
                CacheSource::Edge,
                source,
                policy_ttl,
                started,
                false,
            ));
        }

        // Tier 2: KV
        if let Some(hit) = self.kv.get(&key).await {
            if is_negative_marker(&hit.value) {
                self.metrics.emit(MetricEvent::CacheHit {
                    kind: kind.kind(),
                    tier: "KV",
                });
                return Err(LoadError::NotFound("cached not-found".to_string()));
            }

            let source = hit.source.clone().unwrap_or_else(|| "origin".to_string());

            // Best-effort edge repopulation
            let edge_ttl = self
                .edge
                .default_ttl()
                .min(std::time::Duration::from_secs(hit.remaining_ttl.max(0) as u64));
            self.edge
                .put(&edge_key, wrap_edge_entry(&hit.value, &source), edge_ttl)
                .await;

            self.metrics.emit(MetricEvent::CacheHit {
                kind: kind.kind(),
                tier: "KV",
            });
            return Ok(self.outcome(
                hit.value,
                CacheStatus::Hit,
                CacheSource::Kv,
                source,
                policy_ttl,
                started,
                false,
            ));
        }

        self.metrics.emit(MetricEvent::CacheMiss { kind: kind.kind() });

        // Join or create the coalescing group. Followers subscribe while
        // holding the lock so the leader's send cannot race past them.
        let role = {
            let mut groups = self.coalescer.lock().expect("coalescer lock poisoned");
            match groups.get(&key) {
                Some(tx) => GroupRole::Follower(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    groups.insert(key.clone(), tx.clone());
                    GroupRole::Leader(tx)
                }
            }
        };

        match role {
            GroupRole::Follower(mut rx) => {
                let shared = rx
                    .recv()
                    .await
                    .map_err(|_| LoadError::Upstream("coalesced loader vanished".to_string()))?;
                let loaded = shared?;
                Ok(self.outcome(
                    loaded.value,
                    CacheStatus::Miss,
                    CacheSource::Origin,
                    loaded.source,
                    policy_ttl,
                    started,
                    true,
                ))
            }
            GroupRole::Leader(tx) => {
                let mut guard = GroupGuard {
                    groups: &self.coalescer,
                    key: Some(key.clone()),
                };

                let result = loader().await;

                match &result {
                    Ok(loaded) => {
                        self.write_back(kind, &key, &edge_key, loaded, policy_ttl).await;
                    }
                    Err(LoadError::NotFound(_)) => {
                        if let Some(negative_ttl) = self.settings.negative_ttl {
                            self.kv
                                .put(
                                    &key,
                                    kind.kind(),
                                    &json!({ NEGATIVE_MARKER: true }),
                                    None,
                                    None,
                                    negative_ttl,
                                )
                                .await;
                        }
                    }
                    Err(_) => {}
                }

                // Remove the group, then publish: anyone who subscribed
                // before this point receives the outcome, anyone later
                // starts a fresh group.
                {
                    let mut groups = self.coalescer.lock().expect("coalescer lock poisoned");
                    groups.remove(&key);
                    let _ = tx.send(result.clone());
                }
                guard.disarm();

                let loaded = result?;
                Ok(self.outcome(
                    loaded.value,
                    CacheStatus::Miss,
                    CacheSource::Origin,
                    loaded.source,
                    policy_ttl,
                    started,
                    false,
                ))
            }
        }
    }

    /// Drop both tiers for a fingerprint
    pub async fn invalidate(&self, kind: QueryKind, params: &[(&str, &str)]) {
        let key = fingerprint(kind, params);
        self.edge.delete(&edge_url(&key)).await;
        self.kv.delete(&key).await;
    }

    async fn write_back(
        &self,
        kind: QueryKind,
        key: &str,
        edge_key: &str,
        loaded: &LoadedValue,
        policy_ttl: u64,
    ) {
        if loaded.quality_score < self.settings.quality_floor {
            tracing::debug!(
                key,
                quality = loaded.quality_score,
                floor = self.settings.quality_floor,
                "Value below quality floor, not cached"
            );
            return;
        }

        self.kv
            .put(
                key,
                kind.kind(),
                &loaded.value,
                Some(&loaded.source),
                Some(loaded.quality_score as i64),
                std::time::Duration::from_secs(policy_ttl),
            )
            .await;
        self.edge
            .put(
                edge_key,
                wrap_edge_entry(&loaded.value, &loaded.source),
                self.edge.default_ttl(),
            )
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    fn outcome(
        &self,
        value: Value,
        status: CacheStatus,
        tier: CacheSource,
        source: String,
        ttl_seconds: u64,
        started: Instant,
        coalesced: bool,
    ) -> CacheOutcome {
        CacheOutcome {
            completeness_percent: completeness_percent(&value),
            image_quality: image_quality(&value),
            value,
            status,
            tier,
            source,
            ttl_seconds,
            elapsed_ms: started.elapsed().as_millis() as u64,
            coalesced,
        }
    }
}

/// Edge entries carry the provider source alongside the value so a hit
/// can still report where the data came from.
fn wrap_edge_entry(value: &Value, source: &str) -> Value {
    json!({ "v": value, "src": source })
}

fn unwrap_edge_entry(wrapped: Value) -> (Value, String) {
    let source = wrapped["src"].as_str().unwrap_or("origin").to_string();
    let value = wrapped.get("v").cloned().unwrap_or(Value::Null);
    (value, source)
}

fn is_negative_marker(value: &Value) -> bool {
    value.get(NEGATIVE_MARKER).and_then(Value::as_bool) == Some(true)
}

/// Fraction of expected fields populated on the first record, 0-100.
fn completeness_percent(value: &Value) -> u8 {
    let record = match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let Some(record) = record else {
        return 0;
    };
    if !record.is_object() {
        return 0;
    }

    let edition = record
        .get("editions")
        .and_then(Value::as_array)
        .and_then(|e| e.first());

    let non_empty = |v: Option<&Value>| match v {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Number(n)) => n.as_i64().map(|i| i > 0).unwrap_or(true),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };

    let checks = [
        non_empty(record.get("title")),
        non_empty(record.get("description")),
        non_empty(record.get("subject_tags")),
        non_empty(record.get("authors")),
        non_empty(edition.and_then(|e| e.get("publisher"))),
        non_empty(edition.and_then(|e| e.get("publication_date"))),
        non_empty(edition.and_then(|e| e.get("page_count"))),
        non_empty(edition.and_then(|e| e.get("cover_image_url"))),
    ];

    let present = checks.iter().filter(|c| **c).count();
    ((present * 100) / checks.len()) as u8
}

/// Coarse cover-image quality flag derived from URL features
fn image_quality(value: &Value) -> &'static str {
    let record = match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let url = record
        .and_then(|r| r.get("editions"))
        .and_then(Value::as_array)
        .and_then(|e| e.first())
        .and_then(|e| e.get("cover_image_url"))
        .and_then(Value::as_str);

    match url {
        Some(u) if u.contains("-L.") || u.contains("zoom=") || u.contains("large") => "high",
        Some(_) => "standard",
        None => "none",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::init_memory_pool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn test_cache() -> Arc<UnifiedCache> {
        let pool = init_memory_pool().await.unwrap();
        let settings = Settings::default();
        Arc::new(UnifiedCache::new(
            EdgeCache::new(Duration::from_secs(120)),
            KvCache::new(pool),
            settings.cache,
            MetricsSink::disabled(),
        ))
    }

    fn loaded(value: Value) -> LoadedValue {
        LoadedValue {
            value,
            source: "openlibrary".to_string(),
            quality_score: 80,
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = test_cache().await;
        let params = [("isbn", "9780739314821")];

        let first = cache
            .get_or_load(QueryKind::SearchIsbn, &params, || async {
                Ok(loaded(json!([{"title": "Miss Then Hit"}])))
            })
            .await
            .unwrap();
        assert_eq!(first.status, CacheStatus::Miss);
        assert_eq!(first.tier, CacheSource::Origin);

        let second = cache
            .get_or_load(QueryKind::SearchIsbn, &params, || async {
                panic!("loader must not run on a hit")
            })
            .await
            .unwrap();
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.tier, CacheSource::Edge);
        assert_eq!(second.value, first.value);
        assert_eq!(second.source, "openlibrary");
    }

    #[tokio::test]
    async fn test_kv_hit_repopulates_edge() {
        let cache = test_cache().await;
        let params = [("isbn", "9780439708180")];

        cache
            .get_or_load(QueryKind::SearchIsbn, &params, || async {
                Ok(loaded(json!([{"title": "Cached Book"}])))
            })
            .await
            .unwrap();

        // Clear only the edge tier; the next read must hit KV
        let key = fingerprint(QueryKind::SearchIsbn, &params);
        cache.edge.delete(&edge_url(&key)).await;

        let hit = cache
            .get_or_load(QueryKind::SearchIsbn, &params, || async {
                panic!("loader must not run")
            })
            .await
            .unwrap();
        assert_eq!(hit.status, CacheStatus::Hit);
        assert_eq!(hit.tier, CacheSource::Kv);
        // KV policy TTL for ISBN search is 7 days
        assert_eq!(hit.ttl_seconds, 604_800);

        // And the edge tier is warm again
        let warm = cache
            .get_or_load(QueryKind::SearchIsbn, &params, || async {
                panic!("loader must not run")
            })
            .await
            .unwrap();
        assert_eq!(warm.tier, CacheSource::Edge);
    }

    #[tokio::test]
    async fn test_coalescing_runs_loader_once() {
        let cache = test_cache().await;
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(QueryKind::SearchTitle, &[("q", "dune")], || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(loaded(json!([{"title": "Dune"}])))
                    })
                    .await
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for outcome in &outcomes {
            assert_eq!(outcome.value, json!([{"title": "Dune"}]));
        }
        assert_eq!(outcomes.iter().filter(|o| !o.coalesced).count(), 1);
    }

    #[tokio::test]
    async fn test_coalesced_failure_shared_by_all_waiters() {
        let cache = test_cache().await;
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(QueryKind::SearchTitle, &[("q", "nope")], || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err::<LoadedValue, _>(LoadError::Upstream("boom".to_string()))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Failures are not cached: the next call runs the loader again
        let again = cache
            .get_or_load(QueryKind::SearchTitle, &[("q", "nope")], || async {
                Ok(loaded(json!([])))
            })
            .await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_quality_floor_gates_write_back() {
        let cache = test_cache().await;
        let params = [("q", "low quality")];

        cache
            .get_or_load(QueryKind::SearchTitle, &params, || async {
                Ok(LoadedValue {
                    value: json!([{"title": "Thin"}]),
                    source: "googlebooks".to_string(),
                    quality_score: 5,
                })
            })
            .await
            .unwrap();

        // Below the floor: nothing was written, loader runs again
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_inner = calls.clone();
        cache
            .get_or_load(QueryKind::SearchTitle, &params, || async move {
                calls_inner.fetch_add(1, Ordering::SeqCst);
                Ok(loaded(json!([{"title": "Thin"}])))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_negative_cache_when_configured() {
        let pool = init_memory_pool().await.unwrap();
        let mut settings = Settings::default();
        settings.cache.negative_ttl = Some(Duration::from_secs(60));
        let cache = UnifiedCache::new(
            EdgeCache::new(Duration::from_secs(120)),
            KvCache::new(pool),
            settings.cache,
            MetricsSink::disabled(),
        );

        let params = [("isbn", "9780000000000")];
        let err = cache
            .get_or_load(QueryKind::SearchIsbn, &params, || async {
                Err::<LoadedValue, _>(LoadError::NotFound("no provider match".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));

        // Second read is answered by the negative entry without a loader
        let err = cache
            .get_or_load(QueryKind::SearchIsbn, &params, || async {
                panic!("loader must not run against the negative cache")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn test_completeness_percent() {
        let full = json!([{
            "title": "Dune",
            "description": "A desert planet",
            "subject_tags": ["science fiction"],
            "authors": [{"name": "Frank Herbert"}],
            "editions": [{
                "publisher": "Chilton",
                "publication_date": "1965",
                "page_count": 412,
                "cover_image_url": "https://covers.example/dune-L.jpg"
            }]
        }]);
        assert_eq!(completeness_percent(&full), 100);

        let bare = json!([{"title": "Dune"}]);
        assert_eq!(completeness_percent(&bare), 12);

        assert_eq!(completeness_percent(&json!([])), 0);
    }

    #[test]
    fn test_image_quality_flag() {
        let high = json!([{"editions": [{"cover_image_url": "https://covers.example/x-L.jpg"}]}]);
        assert_eq!(image_quality(&high), "high");
        let standard = json!([{"editions": [{"cover_image_url": "https://covers.example/x-S.jpg"}]}]);
        assert_eq!(image_quality(&standard), "standard");
        assert_eq!(image_quality(&json!([{"title": "x"}])), "none");
    }
}
