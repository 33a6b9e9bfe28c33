//! Common error types for Libris
//!
//! One taxonomy shared by the cache layer, provider orchestration and the
//! batch job subsystem. The HTTP mapping lives with the API layer; this
//! enum only carries the kind and context.

use thiserror::Error;

/// Common result type for Libris operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Libris services
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Expired token")]
    ExpiredToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Token refresh already in progress")]
    RefreshConflict,

    #[error("Payload too large (limit {limit_bytes} bytes)")]
    PayloadTooLarge { limit_bytes: usize },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Upgrade required")]
    UpgradeRequired,

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Provider failure: {0}")]
    Provider(String),

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code, used in response bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Database(_) => "STORAGE_UNAVAILABLE",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Unauthenticated(_) => "UNAUTHENTICATED",
            Error::InvalidToken => "INVALID_TOKEN",
            Error::ExpiredToken => "EXPIRED_TOKEN",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::RefreshConflict => "REFRESH_CONFLICT",
            Error::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Error::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::UpgradeRequired => "UPGRADE_REQUIRED",
            Error::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            Error::Provider(_) => "PROVIDER_FAILURE",
            Error::Storage(_) => "STORAGE_UNAVAILABLE",
            Error::Cancelled => "CANCELLED",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
