//! Error types for the enrichment API surface
//!
//! Maps the common taxonomy onto HTTP responses. Handlers return
//! `ApiResult` and the mapping happens once, here.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Carries the full common taxonomy
    #[error(transparent)]
    Common(#[from] libris_common::Error),

    /// Generic error at the handler boundary
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Common(libris_common::Error::Validation(msg.into()))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::Common(libris_common::Error::NotFound(msg.into()))
    }

    fn status(&self) -> StatusCode {
        use libris_common::Error as E;
        match self {
            ApiError::Common(err) => match err {
                E::Validation(_) | E::Config(_) => StatusCode::BAD_REQUEST,
                E::Unauthenticated(_) | E::InvalidToken | E::ExpiredToken => {
                    StatusCode::UNAUTHORIZED
                }
                E::Forbidden(_) => StatusCode::FORBIDDEN,
                E::NotFound(_) => StatusCode::NOT_FOUND,
                E::Conflict(_) | E::RefreshConflict => StatusCode::CONFLICT,
                E::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                E::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                E::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                E::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
                E::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
                E::Provider(_)
                | E::Storage(_)
                | E::Database(_)
                | E::Io(_)
                | E::Cancelled
                | E::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message, retry_after) = match &self {
            ApiError::Common(err) => {
                let retry = match err {
                    libris_common::Error::RateLimited { retry_after_secs } => {
                        Some(*retry_after_secs)
                    }
                    _ => None,
                };
                (err.code(), err.to_string(), retry)
            }
            ApiError::Other(err) => {
                tracing::error!(error = %err, "Unhandled error at API boundary");
                ("INTERNAL_ERROR", err.to_string(), None)
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = header::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use libris_common::Error;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::validation("bad isbn").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Common(Error::InvalidToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Common(Error::RefreshConflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Common(Error::RateLimited { retry_after_secs: 9 }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Common(Error::DeadlineExceeded("search".into())).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::Common(Error::UpgradeRequired).status(),
            StatusCode::UPGRADE_REQUIRED
        );
        assert_eq!(
            ApiError::Common(Error::PayloadTooLarge { limit_bytes: 1 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let err = ApiError::Common(Error::RateLimited { retry_after_secs: 30 });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "30"
        );
    }
}
