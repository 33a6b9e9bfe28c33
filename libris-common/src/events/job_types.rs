//! Batch job supporting types
//!
//! Status machine and per-item result records shared between the job
//! actor, its persistence layer and the progress stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Batch job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Created but not yet running
    Pending,
    /// Items are being enriched
    Running,
    /// Finished with some failures (0 < failed < total)
    Partial,
    /// Finished with no failures
    Completed,
    /// Every item failed
    Failed,
    /// Cancelled by the client
    Cancelled,
    /// Aged out past the cleanup ceiling
    Expired,
}

impl JobStatus {
    /// Terminal states accept no further item results
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Partial
                | JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::Cancelled
                | JobStatus::Expired
        )
    }

    /// Terminal status derived from the final counters
    pub fn from_counts(failed: usize, total: usize) -> Self {
        if failed == 0 {
            JobStatus::Completed
        } else if failed >= total {
            JobStatus::Failed
        } else {
            JobStatus::Partial
        }
    }
}

/// Outcome of a single batch item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Not yet processed
    Pending,
    /// Canonical record produced
    Enriched,
    /// All providers failed or input was invalid
    Failed,
}

/// Per-item result record, ordered by index within the job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub index: usize,
    /// Original input line (ISBN or free-text query)
    pub input: String,
    pub outcome: ItemOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ItemResult {
    pub fn pending(index: usize, input: impl Into<String>) -> Self {
        Self {
            index,
            input: input.into(),
            outcome: ItemOutcome::Pending,
            book_id: None,
            error_kind: None,
        }
    }
}

/// Point-in-time view of a job, safe to hand outside the actor.
///
/// Never carries the capability token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_items: usize,
    pub completed_items: usize,
    pub failed_items: usize,
    pub items: Vec<ItemResult>,
    /// ISO-8601 UTC
    pub created_at: String,
    /// ISO-8601 UTC
    pub updated_at: String,
    /// Monotone mutation counter
    pub version: u64,
}
