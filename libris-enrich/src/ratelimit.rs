//! Per-principal admission control
//!
//! Fixed 60-second windows keyed by (principal, endpoint class). The
//! whole check-and-increment runs under one lock so a burst can never
//! slip past the limit between read and write. Windows expire at their
//! end and are pruned opportunistically.

use crate::metrics::{MetricEvent, MetricsSink};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Endpoint classes with independent counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Search,
    Batch,
    Import,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Search => "search",
            EndpointClass::Batch => "batch",
            EndpointClass::Import => "import",
        }
    }
}

/// Admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window counter shared by every endpoint
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, EndpointClass), Window>>,
    limit: u32,
    window: Duration,
    metrics: MetricsSink,
}

/// Prune dead windows once the map grows past this
const PRUNE_THRESHOLD: usize = 10_000;

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, metrics: MetricsSink) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit,
            window,
            metrics,
        }
    }

    /// Atomically count this request against the principal's window.
    pub async fn check(&self, principal: &str, class: EndpointClass) -> Admission {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        if windows.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started_at) < window);
        }

        let entry = windows
            .entry((principal.to_string(), class))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        // Window expired: start a fresh one
        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let elapsed = now.duration_since(entry.started_at);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            drop(windows);

            self.metrics.emit(MetricEvent::RateLimited {
                principal: principal.to_string(),
            });
            tracing::debug!(principal, class = class.as_str(), "Request rate limited");

            return Admission::Limited {
                retry_after_secs: retry_after,
            };
        }

        entry.count += 1;
        Admission::Allowed {
            remaining: self.limit - entry.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(limit, window, MetricsSink::disabled())
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_rejects() {
        let limiter = limiter(100, Duration::from_secs(60));

        for _ in 0..100 {
            assert!(matches!(
                limiter.check("1.2.3.4", EndpointClass::Search).await,
                Admission::Allowed { .. }
            ));
        }

        // The 101st request inside the window is limited
        match limiter.check("1.2.3.4", EndpointClass::Search).await {
            Admission::Limited { retry_after_secs } => {
                assert!(retry_after_secs <= 60);
                assert!(retry_after_secs >= 1);
            }
            Admission::Allowed { .. } => panic!("expected rate limit"),
        }
    }

    #[tokio::test]
    async fn test_principals_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(matches!(
            limiter.check("alice", EndpointClass::Search).await,
            Admission::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("bob", EndpointClass::Search).await,
            Admission::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("alice", EndpointClass::Search).await,
            Admission::Limited { .. }
        ));
    }

    #[tokio::test]
    async fn test_endpoint_classes_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(matches!(
            limiter.check("alice", EndpointClass::Search).await,
            Admission::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("alice", EndpointClass::Batch).await,
            Admission::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter(1, Duration::from_millis(50));
        assert!(matches!(
            limiter.check("alice", EndpointClass::Search).await,
            Admission::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("alice", EndpointClass::Search).await,
            Admission::Limited { .. }
        ));

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(matches!(
            limiter.check("alice", EndpointClass::Search).await,
            Admission::Allowed { .. }
        ));
    }
}
