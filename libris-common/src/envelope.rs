//! Canonical response envelope
//!
//! Every HTTP response body is wrapped in the same envelope shape:
//! `{success, data, metadata, error?}`. A feature flag keeps the legacy
//! bare-data shape available for older clients.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a response body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheSource {
    Edge,
    Kv,
    Origin,
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheSource::Edge => f.write_str("EDGE"),
            CacheSource::Kv => f.write_str("KV"),
            CacheSource::Origin => f.write_str("origin"),
        }
    }
}

/// Response metadata block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Provider name or "orchestrated"
    pub source: String,
    /// ISO-8601 UTC
    pub timestamp: String,
    pub cached: bool,
    #[serde(rename = "cacheSource", skip_serializing_if = "Option::is_none")]
    pub cache_source: Option<CacheSource>,
    /// Remaining TTL in seconds, when served from cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

impl ResponseMetadata {
    pub fn origin(source: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp: crate::time::to_iso8601(crate::time::now()),
            cached: false,
            cache_source: None,
            ttl: None,
            request_id: request_id.into(),
        }
    }

    pub fn cached(
        source: impl Into<String>,
        request_id: impl Into<String>,
        cache_source: CacheSource,
        ttl: Option<u64>,
    ) -> Self {
        Self {
            source: source.into(),
            timestamp: crate::time::to_iso8601(crate::time::now()),
            cached: true,
            cache_source: Some(cache_source),
            ttl,
            request_id: request_id.into(),
        }
    }
}

/// Error block carried inside a failed envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        let retry_after = match err {
            Error::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retry_after,
        }
    }
}

/// Canonical response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub metadata: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn ok(data: Value, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            metadata,
            error: None,
        }
    }

    pub fn err(error: &Error, metadata: ResponseMetadata) -> Self {
        Self {
            success: false,
            data: None,
            metadata,
            error: Some(ErrorBody::from(error)),
        }
    }

    /// Legacy body shape: the bare data value without the wrapper.
    pub fn into_legacy(self) -> Value {
        self.data.unwrap_or(Value::Null)
    }
}
