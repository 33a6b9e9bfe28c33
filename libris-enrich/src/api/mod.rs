//! HTTP API handlers for the enrichment service

pub mod batch;
pub mod health;
pub mod import;
pub mod progress_ws;
pub mod respond;
pub mod search;

pub use batch::batch_routes;
pub use health::health_routes;
pub use import::import_routes;
pub use progress_ws::progress_routes;
pub use search::search_routes;

use crate::error::{ApiError, ApiResult};
use crate::ratelimit::{Admission, EndpointClass};
use crate::AppState;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Per-request id, injected by `request_context`
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Middleware: assign a request id and stamp the standard response
/// headers (request id, CORS) on every response.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("X-Request-ID", value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    response
}

/// Extract a bearer token from the Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Derive the rate-limit principal: authenticated identity first, then
/// the peer address, then a shared anonymous bucket.
pub fn principal(headers: &HeaderMap) -> String {
    if let Some(token) = bearer_token(headers) {
        return format!("token:{token}");
    }
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        let trimmed = forwarded.trim();
        if !trimmed.is_empty() {
            return format!("addr:{trimmed}");
        }
    }
    "addr:unknown".to_string()
}

/// Admission-control gate shared by the request handlers
pub async fn admit(state: &AppState, headers: &HeaderMap, class: EndpointClass) -> ApiResult<()> {
    let principal = principal(headers);
    match state.rate_limiter.check(&principal, class).await {
        Admission::Allowed { .. } => Ok(()),
        Admission::Limited { retry_after_secs } => Err(ApiError::Common(
            libris_common::Error::RateLimited { retry_after_secs },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc-123"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc-123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn test_principal_prefers_token() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        assert_eq!(principal(&headers), "addr:1.2.3.4");

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok"),
        );
        assert_eq!(principal(&headers), "token:tok");
    }

    #[test]
    fn test_principal_without_identity() {
        let headers = HeaderMap::new();
        assert_eq!(principal(&headers), "addr:unknown");
    }
}
