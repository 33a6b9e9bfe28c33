//! Import API handlers
//!
//! POST /v1/books/import/csv and POST /v1/bookshelf/scan. Both hand the
//! raw payload to the AI provider as a black box; the parsed candidates
//! either seed a batch job (CSV import) or come straight back to the
//! caller (shelf scan).

use super::respond::data_response;
use super::{admit, principal, RequestId};
use crate::cache::LoadError;
use crate::error::{ApiError, ApiResult};
use crate::ratelimit::EndpointClass;
use crate::AppState;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Extension, Router};
use libris_common::time::to_iso8601;
use libris_common::Error;
use serde_json::json;

/// CSV payload size cap
pub const CSV_SIZE_LIMIT: usize = 10 * 1024 * 1024;

/// Shelf photos per scan
const MAX_SCAN_IMAGES: usize = 8;

/// POST /v1/books/import/csv
///
/// Body is raw CSV text, capped at 10 MiB. Parsed candidates become a
/// batch enrichment job; the response is the same receipt as
/// /v1/batch-enrichment.
pub async fn import_csv(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<Response> {
    admit(&state, &headers, EndpointClass::Import).await?;

    if body.len() > CSV_SIZE_LIMIT {
        return Err(ApiError::Common(Error::PayloadTooLarge {
            limit_bytes: CSV_SIZE_LIMIT,
        }));
    }
    if body.is_empty() {
        return Err(ApiError::validation("CSV body is empty"));
    }

    let csv = std::str::from_utf8(&body)
        .map_err(|_| ApiError::validation("CSV body is not valid UTF-8"))?;

    let inputs = state.books.parse_csv(csv).await.map_err(load_error)?;
    if inputs.is_empty() {
        return Err(ApiError::validation("no usable rows found in CSV"));
    }

    let owner = principal(&headers);
    let receipt = state.jobs.launch(&owner, inputs).await?;

    tracing::info!(
        job_id = %receipt.job_id,
        request_id = %request_id,
        "CSV import job created"
    );

    Ok(data_response(
        &state,
        &request_id,
        "vision",
        StatusCode::CREATED,
        json!({
            "jobId": receipt.job_id,
            "streamURL": receipt.stream_url,
            "authToken": receipt.auth_token,
            "authTokenExpiresAt": to_iso8601(receipt.auth_token_expires_at),
        }),
    ))
}

/// POST /v1/bookshelf/scan
///
/// Multipart image upload. Returns the candidate books the AI provider
/// read off the shelf; enrichment is the client's next call.
pub async fn scan_shelf(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    admit(&state, &headers, EndpointClass::Import).await?;

    let mut images: Vec<Vec<u8>> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
    {
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("unreadable multipart field: {e}")))?;

        if data.is_empty() {
            continue;
        }
        if let Some(ct) = &content_type {
            if !ct.starts_with("image/") {
                return Err(ApiError::Common(Error::UnsupportedMediaType(ct.clone())));
            }
        }

        images.push(data.to_vec());
        if images.len() > MAX_SCAN_IMAGES {
            return Err(ApiError::validation(format!(
                "at most {MAX_SCAN_IMAGES} images per scan"
            )));
        }
    }

    if images.is_empty() {
        return Err(ApiError::validation("no images in scan request"));
    }

    let count = images.len();
    let candidates = state.books.scan_shelf(images).await.map_err(load_error)?;

    tracing::info!(
        request_id = %request_id,
        images = count,
        candidates = candidates.len(),
        "Bookshelf scan complete"
    );

    Ok(data_response(
        &state,
        &request_id,
        "vision",
        StatusCode::OK,
        json!({ "candidates": candidates }),
    ))
}

fn load_error(err: LoadError) -> ApiError {
    ApiError::Common(err.into())
}

/// Build import routes with the raised body limit for CSV payloads
pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/books/import/csv",
            post(import_csv).layer(DefaultBodyLimit::max(CSV_SIZE_LIMIT + 1024)),
        )
        .route(
            "/v1/bookshelf/scan",
            post(scan_shelf).layer(DefaultBodyLimit::max(64 * 1024 * 1024)),
        )
}
