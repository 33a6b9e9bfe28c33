//! Response assembly
//!
//! Wraps handler data in the canonical envelope (or the legacy bare
//! shape when the feature flag is off) and stamps cache observability
//! headers.

use crate::cache::{CacheOutcome, CacheStatus};
use crate::AppState;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Json, Response};
use libris_common::envelope::{Envelope, ResponseMetadata};
use serde_json::Value;

/// Respond with a cache outcome: envelope plus cache headers.
pub fn cache_response(state: &AppState, request_id: &str, outcome: CacheOutcome) -> Response {
    let metadata = if outcome.status == CacheStatus::Hit {
        ResponseMetadata::cached(
            outcome.source.clone(),
            request_id,
            outcome.tier,
            Some(outcome.ttl_seconds),
        )
    } else {
        ResponseMetadata::origin(outcome.source.clone(), request_id)
    };

    let envelope = Envelope::ok(outcome.value.clone(), metadata);
    let body = if state.settings.unified_envelope {
        serde_json::to_value(&envelope).unwrap_or(Value::Null)
    } else {
        envelope.into_legacy()
    };

    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        "X-Cache-Status",
        HeaderValue::from_static(match outcome.status {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }),
    );
    if let Ok(value) = HeaderValue::from_str(&outcome.ttl_seconds.to_string()) {
        headers.insert("X-Cache-TTL", value);
    }
    if let Ok(value) = HeaderValue::from_str(&outcome.tier.to_string()) {
        headers.insert("X-Cache-Tier", value);
    }
    if let Ok(value) = HeaderValue::from_str(&outcome.completeness_percent.to_string()) {
        headers.insert("X-Data-Completeness", value);
    }
    headers.insert(
        "X-Image-Quality",
        HeaderValue::from_static(outcome.image_quality),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("{}ms", outcome.elapsed_ms)) {
        headers.insert("X-Response-Time", value);
    }

    response
}

/// Respond with plain origin data (no cache involvement).
pub fn data_response(
    state: &AppState,
    request_id: &str,
    source: &str,
    status: axum::http::StatusCode,
    data: Value,
) -> Response {
    let envelope = Envelope::ok(data, ResponseMetadata::origin(source, request_id));
    let body = if state.settings.unified_envelope {
        serde_json::to_value(&envelope).unwrap_or(Value::Null)
    } else {
        envelope.into_legacy()
    };
    (status, Json(body)).into_response()
}
