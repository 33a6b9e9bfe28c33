//! Batch enrichment API handlers
//!
//! POST /v1/batch-enrichment, POST /v1/batch-enrichment/{jobId}/cancel,
//! POST /api/token/refresh, GET /v1/batch-enrichment/{jobId}.

use super::respond::data_response;
use super::{admit, bearer_token, principal, RequestId};
use crate::error::{ApiError, ApiResult};
use crate::ratelimit::EndpointClass;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use libris_common::time::to_iso8601;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Upper bound on items per batch
const MAX_BATCH_ITEMS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct LaunchRequest {
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "jobId")]
    pub job_id: Uuid,
    pub token: String,
}

/// POST /v1/batch-enrichment
///
/// Creates a job, returns 201 with the stream URL and the capability
/// token the client needs for the progress stream.
pub async fn launch_batch(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Json(request): Json<LaunchRequest>,
) -> ApiResult<Response> {
    admit(&state, &headers, EndpointClass::Batch).await?;

    let items: Vec<String> = request
        .items
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();

    if items.is_empty() {
        return Err(ApiError::validation("batch requires at least one item"));
    }
    if items.len() > MAX_BATCH_ITEMS {
        return Err(ApiError::validation(format!(
            "batch exceeds {MAX_BATCH_ITEMS} items"
        )));
    }

    let owner = principal(&headers);
    let receipt = state.jobs.launch(&owner, items).await?;

    tracing::info!(
        job_id = %receipt.job_id,
        request_id = %request_id,
        "Batch enrichment job created"
    );

    Ok(data_response(
        &state,
        &request_id,
        "batch",
        StatusCode::CREATED,
        json!({
            "jobId": receipt.job_id,
            "streamURL": receipt.stream_url,
            "authToken": receipt.auth_token,
            "authTokenExpiresAt": to_iso8601(receipt.auth_token_expires_at),
        }),
    ))
}

/// GET /v1/batch-enrichment/{jobId}
///
/// Snapshot of a job's persisted fields.
pub async fn job_status(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Response> {
    let snapshot = state.jobs.snapshot(job_id).await?;
    Ok(data_response(
        &state,
        &request_id,
        "batch",
        StatusCode::OK,
        serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null),
    ))
}

/// POST /v1/batch-enrichment/{jobId}/cancel
pub async fn cancel_batch(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Common(libris_common::Error::Unauthenticated(
            "bearer token required".to_string(),
        )))?;

    let status = state.jobs.cancel(job_id, &token).await?;

    tracing::info!(job_id = %job_id, request_id = %request_id, "Batch job cancelled");

    Ok(data_response(
        &state,
        &request_id,
        "batch",
        StatusCode::OK,
        json!({ "jobId": job_id, "status": status }),
    ))
}

/// POST /api/token/refresh
///
/// Mints a successor token when the current one is inside its refresh
/// window. 400 outside the window, 401 for a bad token, 409 when a
/// refresh is already in flight.
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Response> {
    let envelope = state
        .jobs
        .refresh_token(request.job_id, &request.token)
        .await?;

    tracing::info!(job_id = %request.job_id, request_id = %request_id, "Token refreshed");

    Ok(data_response(
        &state,
        &request_id,
        "batch",
        StatusCode::OK,
        json!({
            "token": envelope.token,
            "expiresAt": to_iso8601(envelope.expires_at),
        }),
    ))
}

/// Build batch routes
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/batch-enrichment", post(launch_batch))
        .route("/v1/batch-enrichment/{job_id}", get(job_status))
        .route("/v1/batch-enrichment/{job_id}/cancel", post(cancel_batch))
        .route("/api/token/refresh", post(refresh_token))
}
