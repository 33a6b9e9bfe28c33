//! Batch job state machine
//!
//! `JobState` is owned exclusively by its actor task. Everything outside
//! the actor sees `JobSnapshot` copies. The capability token lives in a
//! `TokenEnvelope` so the token and its expiry are always handled as a
//! pair.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use libris_common::events::{ItemOutcome, ItemResult, JobSnapshot, JobStatus};
use libris_common::time::to_iso8601;
use std::time::Duration;
use uuid::Uuid;

/// Compare two tokens without leaking position information through
/// timing. Length differences still return early; token length is not
/// secret (always a 36-char UUID string).
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Capability token with its expiry, always stored together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEnvelope {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenEnvelope {
    /// Mint a fresh random token valid for `lifetime` from now
    pub fn mint(lifetime: Duration) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + ChronoDuration::from_std(lifetime).unwrap_or_default(),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Case-sensitive, constant-time comparison against a presented token
    pub fn matches(&self, presented: &str) -> bool {
        constant_time_eq(&self.token, presented)
    }

    /// True when `now` falls inside the refresh window: the token is
    /// still valid but within `window` of expiring.
    pub fn in_refresh_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let remaining = self.expires_at - now;
        remaining > ChronoDuration::zero()
            && remaining <= ChronoDuration::from_std(window).unwrap_or_default()
    }
}

/// Full mutable job state, actor-owned
#[derive(Debug, Clone)]
pub struct JobState {
    pub job_id: Uuid,
    pub owner_principal: String,
    pub status: JobStatus,
    pub items: Vec<ItemResult>,
    pub completed_items: usize,
    pub failed_items: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotone mutation counter; persistence CAS rejects stale writes
    pub version: u64,
    pub token: TokenEnvelope,
    pub refresh_in_progress: bool,
    pub updates_since_last_persist: u32,
    pub last_persisted_at: DateTime<Utc>,
    /// Absolute cleanup deadline
    pub alarm_at: DateTime<Utc>,
}

impl JobState {
    /// Create a new job with pending items, a fresh token and the
    /// cleanup alarm scheduled.
    pub fn new(
        owner_principal: impl Into<String>,
        inputs: Vec<String>,
        token_lifetime: Duration,
        cleanup: Duration,
    ) -> Self {
        let now = Utc::now();
        let items = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| ItemResult::pending(index, input))
            .collect();

        Self {
            job_id: Uuid::new_v4(),
            owner_principal: owner_principal.into(),
            status: JobStatus::Pending,
            items,
            completed_items: 0,
            failed_items: 0,
            created_at: now,
            updated_at: now,
            version: 0,
            token: TokenEnvelope::mint(token_lifetime),
            refresh_in_progress: false,
            updates_since_last_persist: 0,
            last_persisted_at: now,
            alarm_at: now + ChronoDuration::from_std(cleanup).unwrap_or_default(),
        }
    }

    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Every mutation goes through here to keep version and timestamps
    /// monotone.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
        self.updates_since_last_persist += 1;
    }

    /// Record the outcome of one item. Out-of-range indexes are ignored
    /// (they can only come from a bug in the worker, never the client).
    pub fn record_item(
        &mut self,
        index: usize,
        outcome: ItemOutcome,
        book_id: Option<String>,
        error_kind: Option<String>,
    ) {
        let Some(item) = self.items.get_mut(index) else {
            tracing::warn!(job_id = %self.job_id, index, "Item result for unknown index");
            return;
        };

        // Re-delivery of the same index must not double-count
        if item.outcome != ItemOutcome::Pending {
            return;
        }

        item.outcome = outcome;
        item.book_id = book_id;
        item.error_kind = error_kind;

        match outcome {
            ItemOutcome::Enriched => self.completed_items += 1,
            ItemOutcome::Failed => self.failed_items += 1,
            ItemOutcome::Pending => {}
        }

        self.touch();
    }

    /// All items resolved?
    pub fn all_items_done(&self) -> bool {
        self.completed_items + self.failed_items >= self.total_items()
    }

    /// Terminal status derived from counters
    pub fn derive_terminal_status(&self) -> JobStatus {
        JobStatus::from_counts(self.failed_items, self.total_items())
    }

    pub fn transition_to(&mut self, status: JobStatus) {
        tracing::info!(
            job_id = %self.job_id,
            old_status = ?self.status,
            new_status = ?status,
            "Job state transition"
        );
        self.status = status;
        self.touch();
    }

    /// Should this mutation trigger a persist?
    ///
    /// Persist on terminal transition, after `update_count` buffered
    /// mutations, or when `interval` has passed since the last persist.
    pub fn persist_due(&self, update_count: u32, interval: Duration, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return true;
        }
        if self.updates_since_last_persist >= update_count {
            return true;
        }
        now - self.last_persisted_at >= ChronoDuration::from_std(interval).unwrap_or_default()
    }

    /// Reset the persistence throttle after a successful write
    pub fn mark_persisted(&mut self) {
        self.updates_since_last_persist = 0;
        self.last_persisted_at = Utc::now();
    }

    /// Point-in-time view without the token
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            status: self.status,
            total_items: self.total_items(),
            completed_items: self.completed_items,
            failed_items: self.failed_items,
            items: self.items.clone(),
            created_at: to_iso8601(self.created_at),
            updated_at: to_iso8601(self.updated_at),
            version: self.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job(items: usize) -> JobState {
        JobState::new(
            "tester",
            (0..items).map(|i| format!("978000000000{i}")).collect(),
            Duration::from_secs(7200),
            Duration::from_secs(86_400),
        )
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ABC"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn test_token_is_uuid_shaped() {
        let envelope = TokenEnvelope::mint(Duration::from_secs(7200));
        assert_eq!(envelope.token.len(), 36);
        assert!(envelope.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_distinct_launches_produce_distinct_tokens() {
        let a = TokenEnvelope::mint(Duration::from_secs(7200));
        let b = TokenEnvelope::mint(Duration::from_secs(7200));
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_refresh_window() {
        let window = Duration::from_secs(1800);
        let envelope = TokenEnvelope::mint(Duration::from_secs(7200));

        // Fresh token: 2h remaining, outside the 30min window
        assert!(!envelope.in_refresh_window(Utc::now(), window));

        // 10 minutes remaining: inside
        let late = envelope.expires_at - ChronoDuration::minutes(10);
        assert!(envelope.in_refresh_window(late, window));

        // Already expired: outside
        let expired = envelope.expires_at + ChronoDuration::seconds(1);
        assert!(!envelope.in_refresh_window(expired, window));
    }

    #[test]
    fn test_record_item_counts() {
        let mut job = test_job(5);
        job.record_item(0, ItemOutcome::Enriched, Some("w1".into()), None);
        job.record_item(1, ItemOutcome::Failed, None, Some("PROVIDER_FAILURE".into()));
        assert_eq!(job.completed_items, 1);
        assert_eq!(job.failed_items, 1);
        assert!(!job.all_items_done());
    }

    #[test]
    fn test_record_item_is_idempotent_per_index() {
        let mut job = test_job(2);
        job.record_item(0, ItemOutcome::Enriched, None, None);
        job.record_item(0, ItemOutcome::Failed, None, None);
        assert_eq!(job.completed_items, 1);
        assert_eq!(job.failed_items, 0);
    }

    #[test]
    fn test_terminal_status_derivation() {
        let mut job = test_job(5);
        for i in 0..4 {
            job.record_item(i, ItemOutcome::Enriched, None, None);
        }
        job.record_item(4, ItemOutcome::Failed, None, None);
        assert!(job.all_items_done());
        assert_eq!(job.derive_terminal_status(), JobStatus::Partial);
    }

    #[test]
    fn test_version_increments_on_mutation() {
        let mut job = test_job(1);
        let v0 = job.version;
        job.transition_to(JobStatus::Running);
        job.record_item(0, ItemOutcome::Enriched, None, None);
        assert!(job.version > v0 + 1);
    }

    #[test]
    fn test_persist_throttling() {
        let mut job = test_job(20);
        job.mark_persisted();
        let interval = Duration::from_secs(5);

        assert!(!job.persist_due(10, interval, Utc::now()));

        for i in 0..10 {
            job.record_item(i, ItemOutcome::Enriched, None, None);
        }
        assert!(job.persist_due(10, interval, Utc::now()));

        job.mark_persisted();
        assert!(!job.persist_due(10, interval, Utc::now()));

        // Time-based persist
        let later = Utc::now() + ChronoDuration::seconds(6);
        assert!(job.persist_due(10, interval, later));

        // Terminal transition always persists
        job.transition_to(JobStatus::Cancelled);
        assert!(job.persist_due(10, interval, Utc::now()));
    }

    #[test]
    fn test_snapshot_has_no_token() {
        let job = test_job(1);
        let snapshot = job.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains(&job.token.token));
    }
}
