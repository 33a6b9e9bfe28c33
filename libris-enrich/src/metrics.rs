//! Structured metrics emission
//!
//! Fire-and-forget event sink. Emission never blocks and never fails the
//! request path: events go over an unbounded channel to a background
//! task that writes structured log lines. Dropping the sink (tests) just
//! drops the events.

use libris_common::events::JobStatus;
use libris_common::model::ProviderName;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Metric events emitted around the request path
#[derive(Debug, Clone)]
pub enum MetricEvent {
    CacheHit {
        kind: &'static str,
        tier: &'static str,
    },
    CacheMiss {
        kind: &'static str,
    },
    ProviderCall {
        provider: ProviderName,
        elapsed_ms: u64,
        success: bool,
    },
    JobTransition {
        job_id: Uuid,
        status: JobStatus,
    },
    RateLimited {
        principal: String,
    },
}

/// Cloneable handle for emitting metric events
#[derive(Debug, Clone)]
pub struct MetricsSink {
    tx: mpsc::UnboundedSender<MetricEvent>,
}

impl MetricsSink {
    /// Create the sink and spawn its background consumer.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(consume(rx));
        Self { tx }
    }

    /// Sink that drops every event, for tests.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Emit an event. Never blocks; a closed channel is ignored.
    pub fn emit(&self, event: MetricEvent) {
        let _ = self.tx.send(event);
    }
}

async fn consume(mut rx: mpsc::UnboundedReceiver<MetricEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            MetricEvent::CacheHit { kind, tier } => {
                tracing::info!(target: "libris::metrics", metric = "cache_hit", kind, tier);
            }
            MetricEvent::CacheMiss { kind } => {
                tracing::info!(target: "libris::metrics", metric = "cache_miss", kind);
            }
            MetricEvent::ProviderCall {
                provider,
                elapsed_ms,
                success,
            } => {
                tracing::info!(
                    target: "libris::metrics",
                    metric = "provider_call",
                    provider = %provider,
                    elapsed_ms,
                    success
                );
            }
            MetricEvent::JobTransition { job_id, status } => {
                tracing::info!(
                    target: "libris::metrics",
                    metric = "job_transition",
                    job_id = %job_id,
                    status = ?status
                );
            }
            MetricEvent::RateLimited { principal } => {
                tracing::info!(
                    target: "libris::metrics",
                    metric = "rate_limited",
                    principal = %principal
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_never_fails_with_dropped_consumer() {
        let sink = MetricsSink::disabled();
        // Receiver already dropped; emission must be a no-op.
        sink.emit(MetricEvent::CacheMiss { kind: "search" });
        sink.emit(MetricEvent::RateLimited {
            principal: "1.2.3.4".to_string(),
        });
    }

    #[tokio::test]
    async fn test_spawned_sink_accepts_events() {
        let sink = MetricsSink::spawn();
        sink.emit(MetricEvent::CacheHit {
            kind: "enrich",
            tier: "EDGE",
        });
        sink.emit(MetricEvent::ProviderCall {
            provider: ProviderName::OpenLibrary,
            elapsed_ms: 12,
            success: true,
        });
    }
}
