//! Progress-stream event types
//!
//! Typed messages exchanged over the duplex progress channel between the
//! batch job actor and its attached client. Wire shape is
//! `{type, jobId, seq, payload}` with a monotonic per-job `seq`.

mod job_types;

pub use job_types::{ItemOutcome, ItemResult, JobSnapshot, JobStatus};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of a coalesced progress update
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub completed_items: usize,
    pub failed_items: usize,
    pub total_items: usize,
    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
}

impl ProgressPayload {
    pub fn new(completed: usize, failed: usize, total: usize) -> Self {
        let done = completed + failed;
        Self {
            completed_items: completed,
            failed_items: failed,
            total_items: total,
            percentage: if total > 0 {
                (done as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

/// Payload of a terminal message (completed/failed/cancelled)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalPayload {
    pub status: JobStatus,
    pub completed_items: usize,
    pub failed_items: usize,
    pub total_items: usize,
}

/// Payload of the hello message sent on every attach
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub status: JobStatus,
    pub total_items: usize,
    /// True when this attach replaces an earlier stream for the same job
    pub resumed: bool,
}

/// Messages sent by the actor to the attached client.
///
/// Serialized with an external `type` tag so the wire format is
/// `{"type": "itemDone", "jobId": ..., "seq": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StreamMessage {
    Hello {
        job_id: Uuid,
        seq: u64,
        payload: HelloPayload,
    },
    Progress {
        job_id: Uuid,
        seq: u64,
        payload: ProgressPayload,
    },
    ItemDone {
        job_id: Uuid,
        seq: u64,
        payload: ItemResult,
    },
    Snapshot {
        job_id: Uuid,
        seq: u64,
        payload: JobSnapshot,
    },
    Completed {
        job_id: Uuid,
        seq: u64,
        payload: TerminalPayload,
    },
    Failed {
        job_id: Uuid,
        seq: u64,
        payload: TerminalPayload,
    },
    Cancelled {
        job_id: Uuid,
        seq: u64,
        payload: TerminalPayload,
    },
    Ping {
        job_id: Uuid,
        seq: u64,
    },
}

impl StreamMessage {
    pub fn seq(&self) -> u64 {
        match self {
            StreamMessage::Hello { seq, .. }
            | StreamMessage::Progress { seq, .. }
            | StreamMessage::ItemDone { seq, .. }
            | StreamMessage::Snapshot { seq, .. }
            | StreamMessage::Completed { seq, .. }
            | StreamMessage::Failed { seq, .. }
            | StreamMessage::Cancelled { seq, .. }
            | StreamMessage::Ping { seq, .. } => *seq,
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            StreamMessage::Hello { job_id, .. }
            | StreamMessage::Progress { job_id, .. }
            | StreamMessage::ItemDone { job_id, .. }
            | StreamMessage::Snapshot { job_id, .. }
            | StreamMessage::Completed { job_id, .. }
            | StreamMessage::Failed { job_id, .. }
            | StreamMessage::Cancelled { job_id, .. }
            | StreamMessage::Ping { job_id, .. } => *job_id,
        }
    }

    /// True for messages that end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamMessage::Completed { .. }
                | StreamMessage::Failed { .. }
                | StreamMessage::Cancelled { .. }
        )
    }

    /// Event type name as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Hello { .. } => "hello",
            StreamMessage::Progress { .. } => "progress",
            StreamMessage::ItemDone { .. } => "itemDone",
            StreamMessage::Snapshot { .. } => "snapshot",
            StreamMessage::Completed { .. } => "completed",
            StreamMessage::Failed { .. } => "failed",
            StreamMessage::Cancelled { .. } => "cancelled",
            StreamMessage::Ping { .. } => "ping",
        }
    }
}

/// Messages sent by the client to the actor over the duplex channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Resume delivery after `last_seq`; actor replays retained messages
    Resume { last_seq: u64 },
    /// Liveness response to a ping
    Pong,
    /// Cancel the job; requires the capability token
    Cancel { token: String },
}
