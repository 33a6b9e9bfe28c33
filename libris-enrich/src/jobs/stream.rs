//! Progress stream state
//!
//! Owned by the job actor: one attached client at a time, a monotonic
//! sequence counter, a bounded replay buffer for reconnects, burst
//! coalescing for progress updates and ping/pong liveness tracking.
//! The transport (WebSocket) lives in the API layer; this module only
//! orders and buffers messages.

use libris_common::events::{
    HelloPayload, JobSnapshot, ProgressPayload, StreamMessage, TerminalPayload,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Minimum retained messages for resume
pub const RETENTION_CAPACITY: usize = 256;

/// At most one coalesced progress message per stream per this interval
pub const PROGRESS_COALESCE_INTERVAL: Duration = Duration::from_millis(250);

/// Idle interval before a ping is sent
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Close the stream when a ping stays unanswered this long
pub const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound channel capacity towards one client
const CLIENT_CHANNEL_CAPACITY: usize = 64;

struct AttachedClient {
    tx: mpsc::Sender<StreamMessage>,
    last_send: Instant,
    ping_outstanding: Option<Instant>,
}

/// Ordered, resumable message stream for one job
pub struct ProgressStream {
    job_id: Uuid,
    seq: u64,
    retention: VecDeque<StreamMessage>,
    client: Option<AttachedClient>,
    pending_progress: Option<ProgressPayload>,
    last_progress_sent: Option<Instant>,
}

impl ProgressStream {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            seq: 0,
            retention: VecDeque::with_capacity(RETENTION_CAPACITY),
            client: None,
            pending_progress: None,
            last_progress_sent: None,
        }
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn current_seq(&self) -> u64 {
        self.seq
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn retain(&mut self, message: StreamMessage) {
        // Only content messages are replayable; hello/snapshot are
        // attach-scoped and pings are liveness-scoped.
        if matches!(
            message,
            StreamMessage::Hello { .. }
                | StreamMessage::Snapshot { .. }
                | StreamMessage::Ping { .. }
        ) {
            return;
        }
        if self.retention.len() >= RETENTION_CAPACITY {
            self.retention.pop_front();
        }
        self.retention.push_back(message);
    }

    fn deliver(&mut self, message: &StreamMessage) {
        let Some(client) = &mut self.client else {
            return;
        };

        match client.tx.try_send(message.clone()) {
            Ok(()) => {
                client.last_send = Instant::now();
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Slow consumer: drop the connection, retention allows a
                // clean resume.
                tracing::warn!(job_id = %self.job_id, "Stream client too slow, detaching");
                self.client = None;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(job_id = %self.job_id, "Stream client gone, detaching");
                self.client = None;
            }
        }
    }

    /// Emit a non-coalescable message: retained and delivered in order.
    fn emit(&mut self, build: impl FnOnce(Uuid, u64) -> StreamMessage) -> u64 {
        let seq = self.next_seq();
        let message = build(self.job_id, seq);
        self.retain(message.clone());
        self.deliver(&message);
        seq
    }

    /// Attach a client, replacing any previous one.
    ///
    /// Sends hello, then a snapshot, then replays retained messages
    /// newer than `resume_after` (when given), then goes live. Returns
    /// the receiving half for the transport task.
    pub fn attach(
        &mut self,
        snapshot: JobSnapshot,
        resume_after: Option<u64>,
    ) -> mpsc::Receiver<StreamMessage> {
        let resumed = self.client.is_some() || resume_after.is_some();
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        self.client = Some(AttachedClient {
            tx,
            last_send: Instant::now(),
            ping_outstanding: None,
        });

        let hello = HelloPayload {
            status: snapshot.status,
            total_items: snapshot.total_items,
            resumed,
        };
        self.emit(|job_id, seq| StreamMessage::Hello {
            job_id,
            seq,
            payload: hello,
        });
        self.emit(|job_id, seq| StreamMessage::Snapshot {
            job_id,
            seq,
            payload: snapshot,
        });

        if let Some(last_seq) = resume_after {
            let replay: Vec<StreamMessage> = self
                .retention
                .iter()
                .filter(|m| m.seq() > last_seq)
                .cloned()
                .collect();
            let count = replay.len();
            for message in replay {
                self.deliver(&message);
            }
            tracing::debug!(job_id = %self.job_id, count, "Replayed retained messages");
        }

        rx
    }

    /// Drop the attached client without a terminal message
    pub fn detach(&mut self) {
        self.client = None;
    }

    /// Queue a progress update, coalescing bursts.
    pub fn push_progress(&mut self, payload: ProgressPayload) {
        let now = Instant::now();
        let due = match self.last_progress_sent {
            Some(last) => now.duration_since(last) >= PROGRESS_COALESCE_INTERVAL,
            None => true,
        };

        if due {
            self.last_progress_sent = Some(now);
            self.pending_progress = None;
            self.emit(|job_id, seq| StreamMessage::Progress {
                job_id,
                seq,
                payload,
            });
        } else {
            // Within the coalesce interval: remember only the newest
            self.pending_progress = Some(payload);
        }
    }

    /// Item completion is never coalesced
    pub fn push_item_done(&mut self, payload: libris_common::events::ItemResult) {
        self.emit(|job_id, seq| StreamMessage::ItemDone {
            job_id,
            seq,
            payload,
        });
    }

    /// Terminal message; the caller closes the transport afterwards.
    pub fn push_terminal(&mut self, payload: TerminalPayload) {
        use libris_common::events::JobStatus;
        let status = payload.status;
        self.emit(|job_id, seq| match status {
            JobStatus::Cancelled => StreamMessage::Cancelled {
                job_id,
                seq,
                payload,
            },
            JobStatus::Failed | JobStatus::Expired => StreamMessage::Failed {
                job_id,
                seq,
                payload,
            },
            _ => StreamMessage::Completed {
                job_id,
                seq,
                payload,
            },
        });
    }

    /// Record a pong from the client
    pub fn pong(&mut self) {
        if let Some(client) = &mut self.client {
            client.ping_outstanding = None;
        }
    }

    /// Periodic tick: flush coalesced progress, manage ping liveness.
    pub fn tick(&mut self) {
        let now = Instant::now();

        // Flush a coalesced progress update once the interval passed
        if let Some(payload) = self.pending_progress.take() {
            let due = match self.last_progress_sent {
                Some(last) => now.duration_since(last) >= PROGRESS_COALESCE_INTERVAL,
                None => true,
            };
            if due {
                self.last_progress_sent = Some(now);
                self.emit(|job_id, seq| StreamMessage::Progress {
                    job_id,
                    seq,
                    payload,
                });
            } else {
                self.pending_progress = Some(payload);
            }
        }

        let (ping_outstanding, last_send) = match &self.client {
            Some(client) => (client.ping_outstanding, client.last_send),
            None => return,
        };

        // Unanswered ping past the timeout: close the stream
        if let Some(pinged_at) = ping_outstanding {
            if now.duration_since(pinged_at) >= PONG_TIMEOUT {
                tracing::info!(job_id = %self.job_id, "Stream client failed ping check, detaching");
                self.client = None;
            }
            return;
        }

        // Idle: send a ping
        if now.duration_since(last_send) >= PING_INTERVAL {
            if let Some(client) = &mut self.client {
                client.ping_outstanding = Some(now);
            }
            self.emit(|job_id, seq| StreamMessage::Ping { job_id, seq });
        }
    }
}
