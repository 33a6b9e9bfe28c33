//! Health check endpoint

use crate::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: String,
    /// AI provider configured and usable
    pub vision_provider: bool,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    let database = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db)
        .await
    {
        Ok(_) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check database probe failed");
            "unavailable".to_string()
        }
    };

    let status = if database == "ok" { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        module: "libris-enrich".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        database,
        vision_provider: state.books.has_vision(),
    })
}

/// Build health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
