//! Search API handlers
//!
//! GET /v1/search/isbn, /v1/search/title, /v1/search/author. All three
//! run the rate limiter, then the cache-fronted read path, and answer
//! with the canonical envelope. Empty results are 200 with an empty
//! list, never 404.

use super::respond::cache_response;
use super::{admit, RequestId};
use crate::cache::LoadError;
use crate::error::{ApiError, ApiResult};
use crate::orchestrate::DEFAULT_MAX_RESULTS;
use crate::ratelimit::EndpointClass;
use crate::service::as_isbn;
use crate::AppState;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Router};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct IsbnQuery {
    pub isbn: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    pub q: Option<String>,
    #[serde(rename = "maxResults")]
    pub max_results: Option<usize>,
}

/// GET /v1/search/isbn?isbn=…
pub async fn search_isbn(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Query(query): Query<IsbnQuery>,
) -> ApiResult<Response> {
    admit(&state, &headers, EndpointClass::Search).await?;

    let raw = query
        .isbn
        .ok_or_else(|| ApiError::validation("query parameter 'isbn' is required"))?;
    let isbn = as_isbn(&raw)
        .ok_or_else(|| ApiError::validation(format!("'{raw}' is not a valid ISBN-10 or ISBN-13")))?;

    tracing::debug!(isbn = %isbn, request_id = %request_id, "ISBN search");

    respond(&state, &request_id, state.books.search_isbn(&isbn).await)
}

/// GET /v1/cover?isbn=…
///
/// Cover-provider lookup only; the full enrichment path is the batch
/// and ISBN search surfaces.
pub async fn cover_isbn(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Query(query): Query<IsbnQuery>,
) -> ApiResult<Response> {
    admit(&state, &headers, EndpointClass::Search).await?;

    let raw = query
        .isbn
        .ok_or_else(|| ApiError::validation("query parameter 'isbn' is required"))?;
    let isbn = as_isbn(&raw)
        .ok_or_else(|| ApiError::validation(format!("'{raw}' is not a valid ISBN-10 or ISBN-13")))?;

    tracing::debug!(isbn = %isbn, request_id = %request_id, "Cover lookup");

    respond(&state, &request_id, state.books.cover_isbn(&isbn).await)
}

/// GET /v1/search/title?q=…&maxResults=…
pub async fn search_title(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Query(query): Query<TextQuery>,
) -> ApiResult<Response> {
    admit(&state, &headers, EndpointClass::Search).await?;

    let q = non_empty_query(query.q)?;
    let limit = query.max_results.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, 40);

    tracing::debug!(q = %q, limit, request_id = %request_id, "Title search");

    respond(&state, &request_id, state.books.search_title(&q, limit).await)
}

/// GET /v1/search/author?q=…
pub async fn search_author(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Query(query): Query<TextQuery>,
) -> ApiResult<Response> {
    admit(&state, &headers, EndpointClass::Search).await?;

    let q = non_empty_query(query.q)?;
    let limit = query.max_results.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, 40);

    tracing::debug!(q = %q, limit, request_id = %request_id, "Author search");

    respond(&state, &request_id, state.books.search_author(&q, limit).await)
}

fn non_empty_query(q: Option<String>) -> ApiResult<String> {
    match q {
        Some(q) if !q.trim().is_empty() => Ok(q.trim().to_string()),
        _ => Err(ApiError::validation("query parameter 'q' is required")),
    }
}

/// Map the read-path outcome to a response. A hard not-found from every
/// provider is an empty result: 200 with an empty list, never 404.
fn respond(
    state: &AppState,
    request_id: &str,
    result: Result<crate::cache::CacheOutcome, LoadError>,
) -> ApiResult<Response> {
    match result {
        Ok(outcome) => Ok(cache_response(state, request_id, outcome)),
        Err(LoadError::NotFound(_)) => Ok(super::respond::data_response(
            state,
            request_id,
            "orchestrated",
            axum::http::StatusCode::OK,
            serde_json::json!([]),
        )),
        Err(other) => Err(ApiError::Common(other.into())),
    }
}

/// Build search routes
pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/search/isbn", get(search_isbn))
        .route("/v1/search/title", get(search_title))
        .route("/v1/search/author", get(search_author))
        .route("/v1/cover", get(cover_isbn))
}
