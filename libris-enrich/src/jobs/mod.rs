//! Batch job coordination
//!
//! One actor per job id, a registry of mailboxes, persisted state with
//! CAS versioning, a capability token with a bounded refresh window, and
//! an ordered, resumable progress stream.

pub mod actor;
pub mod registry;
pub mod state;
pub mod stream;

pub use actor::JobCommand;
pub use registry::{JobRegistry, LaunchReceipt};
pub use state::{JobState, TokenEnvelope};
pub use stream::ProgressStream;

use async_trait::async_trait;

/// The read path a batch worker runs per item.
///
/// Implemented over the unified cache + orchestrator in the service
/// wiring; tests substitute fakes.
#[async_trait]
pub trait ItemEnricher: Send + Sync {
    /// Enrich one input (ISBN or free-text query).
    ///
    /// Ok carries a book identifier for the item result; Err carries a
    /// stable error-kind label.
    async fn enrich(&self, input: &str) -> Result<String, String>;
}
