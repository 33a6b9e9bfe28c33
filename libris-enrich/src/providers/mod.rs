//! External metadata provider clients
//!
//! One client module per provider. Clients classify every failure into
//! the shared taxonomy and never panic into the orchestrator; raw
//! response shapes stay inside their module and only canonical DTOs
//! (via `normalize`) leave this layer.

pub mod google_books;
pub mod isbndb;
pub mod open_library;
pub mod vision;

pub use google_books::GoogleBooksClient;
pub use isbndb::IsbndbClient;
pub use open_library::OpenLibraryClient;
pub use vision::VisionClient;

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("Libris/", env!("CARGO_PKG_VERSION"), " (enrichment service)");

/// Provider failure taxonomy
///
/// Every provider error is mapped into exactly one of these kinds so
/// the orchestrator can decide fallback behavior without knowing which
/// provider failed.
#[derive(Debug, Clone, Error)]
pub enum ProviderFailure {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider rejected credentials")]
    Unauthenticated,

    #[error("provider rejected request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("provider server error {0}")]
    Transient5xx(u16),

    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),

    #[error("network error: {0}")]
    Network(String),
}

impl ProviderFailure {
    /// Short stable label used in item results and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderFailure::Timeout => "TIMEOUT",
            ProviderFailure::RateLimited { .. } => "RATE_LIMITED",
            ProviderFailure::Unauthenticated => "UNAUTHENTICATED",
            ProviderFailure::BadRequest(_) => "BAD_REQUEST",
            ProviderFailure::NotFound => "NOT_FOUND",
            ProviderFailure::Transient5xx(_) => "TRANSIENT_5XX",
            ProviderFailure::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            ProviderFailure::Network(_) => "NETWORK",
        }
    }

    /// Hard not-found: the provider authoritatively has no record
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderFailure::NotFound)
    }
}

/// Map a non-success HTTP status into the taxonomy
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body_hint: &str,
) -> ProviderFailure {
    match status {
        StatusCode::NOT_FOUND => ProviderFailure::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderFailure::Unauthenticated,
        StatusCode::TOO_MANY_REQUESTS => ProviderFailure::RateLimited { retry_after_secs },
        s if s.is_client_error() => ProviderFailure::BadRequest(body_hint.to_string()),
        s if s.is_server_error() => ProviderFailure::Transient5xx(s.as_u16()),
        s => ProviderFailure::Network(format!("unexpected status {s}")),
    }
}

/// Map a transport-level reqwest error into the taxonomy
pub(crate) fn classify_transport(err: reqwest::Error) -> ProviderFailure {
    if err.is_timeout() {
        ProviderFailure::Timeout
    } else if err.is_decode() {
        ProviderFailure::MalformedPayload(err.to_string())
    } else {
        ProviderFailure::Network(err.to_string())
    }
}

/// Read a Retry-After header as whole seconds
pub(crate) fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Shared HTTP client construction with the service User-Agent and the
/// hard per-request timeout.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProviderFailure> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderFailure::Network(e.to_string()))
}
