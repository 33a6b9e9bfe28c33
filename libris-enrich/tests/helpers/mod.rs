//! Shared test helpers
//!
//! Mock provider servers and application state wiring for API-level
//! integration tests.

#![allow(dead_code)]

use axum::Router;
use libris_common::config::TomlConfig;
use libris_enrich::config::Settings;
use libris_enrich::metrics::MetricsSink;
use libris_enrich::{db, AppState};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Serve a mock provider router on an ephemeral port, returning its
/// base URL.
pub async fn spawn_mock_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Default test configuration pointing every provider at the mock base
pub fn test_config(provider_base: &str) -> TomlConfig {
    let mut cfg = TomlConfig::default();
    cfg.providers.open_library_base_url = Some(provider_base.to_string());
    cfg.providers.google_books_base_url = Some(provider_base.to_string());
    cfg.providers.vision_base_url = Some(provider_base.to_string());
    cfg
}

/// Build full application state over an in-memory database
pub async fn test_state(cfg: TomlConfig) -> AppState {
    let settings = Settings::from_toml(&cfg).expect("test settings");
    let pool = db::init_memory_pool().await.expect("test pool");
    AppState::initialize(
        settings,
        pool,
        MetricsSink::disabled(),
        CancellationToken::new(),
    )
    .expect("test state")
}

/// Read a response body as JSON
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("body is JSON")
}
