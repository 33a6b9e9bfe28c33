//! Batch enrichment API integration tests
//!
//! Launch, status polling, cancellation and token refresh over the full
//! router, with mock providers deciding which items succeed.

mod helpers;

use axum::extract::Query;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use helpers::{body_json, spawn_mock_server, test_config, test_state};
use libris_enrich::build_router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tower::ServiceExt;

/// Mock catalog: ISBNs starting with 99 are unknown everywhere, the
/// rest resolve to a small record. An optional per-request delay keeps
/// jobs observable mid-flight.
fn mock_providers(delay: Duration) -> Router {
    let ol = move |Query(params): Query<HashMap<String, String>>| async move {
        tokio::time::sleep(delay).await;
        let q = params.get("q").cloned().unwrap_or_default();
        let isbn = q.strip_prefix("isbn:").unwrap_or(&q).to_string();
        if isbn.starts_with("99") {
            Json(json!({"numFound": 0, "docs": []}))
        } else {
            Json(json!({
                "numFound": 1,
                "docs": [{
                    "title": format!("Book {isbn}"),
                    "author_name": ["Test Author"],
                    "isbn": [isbn],
                    "publisher": ["Test House"]
                }]
            }))
        }
    };

    Router::new()
        .route("/search.json", get(ol))
        .route(
            "/volumes",
            get(|| async { Json(json!({"totalItems": 0, "items": []})) }),
        )
}

fn post_json(uri: &str, body: Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

async fn launch(app: &axum::Router, items: Value) -> Value {
    let response = app
        .clone()
        .oneshot(post_json("/v1/batch-enrichment", json!({ "items": items })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    body["data"].clone()
}

async fn poll_until_terminal(app: &axum::Router, job_id: &str) -> Value {
    for _ in 0..300 {
        let response = app
            .clone()
            .oneshot(get_request(&format!("/v1/batch-enrichment/{job_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let status = body["data"]["status"].as_str().unwrap().to_string();
        if status != "PENDING" && status != "RUNNING" {
            return body["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job never reached a terminal state");
}

#[tokio::test]
async fn test_launch_returns_capability_receipt() {
    let base = spawn_mock_server(mock_providers(Duration::ZERO)).await;
    let app = build_router(test_state(test_config(&base)).await);

    let data = launch(&app, json!(["9780439708180"])).await;
    assert!(data["jobId"].is_string());
    assert_eq!(data["authToken"].as_str().unwrap().len(), 36);
    assert!(data["streamURL"]
        .as_str()
        .unwrap()
        .contains(data["jobId"].as_str().unwrap()));
    assert!(data["authTokenExpiresAt"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_batch_lifecycle_partial() {
    let base = spawn_mock_server(mock_providers(Duration::ZERO)).await;
    let app = build_router(test_state(test_config(&base)).await);

    let data = launch(
        &app,
        json!([
            "9780439708180",
            "9780739314821",
            "9780441013593",
            "9780441569564",
            "9900000000000"
        ]),
    )
    .await;
    let job_id = data["jobId"].as_str().unwrap();

    let terminal = poll_until_terminal(&app, job_id).await;
    assert_eq!(terminal["status"], json!("PARTIAL"));
    assert_eq!(terminal["completedItems"], json!(4));
    assert_eq!(terminal["failedItems"], json!(1));

    let items = terminal["items"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[4]["outcome"], json!("failed"));
    assert_eq!(items[4]["errorKind"], json!("NOT_FOUND"));
    assert_eq!(items[0]["outcome"], json!("enriched"));
    assert_eq!(items[0]["bookId"], json!("9780439708180"));
}

#[tokio::test]
async fn test_empty_batch_rejected() {
    let base = spawn_mock_server(mock_providers(Duration::ZERO)).await;
    let app = build_router(test_state(test_config(&base)).await);

    let response = app
        .oneshot(post_json("/v1/batch-enrichment", json!({"items": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_requires_token_and_is_idempotent() {
    // Slow providers keep the job running while we cancel it
    let base = spawn_mock_server(mock_providers(Duration::from_millis(100))).await;
    let app = build_router(test_state(test_config(&base)).await);

    let items: Vec<String> = (0..20).map(|i| format!("978000000{i:04}")).collect();
    let data = launch(&app, json!(items)).await;
    let job_id = data["jobId"].as_str().unwrap();
    let token = data["authToken"].as_str().unwrap();

    // Missing token
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/v1/batch-enrichment/{job_id}/cancel"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v1/batch-enrichment/{job_id}/cancel"))
                .header(header::AUTHORIZATION, "Bearer wrong-token")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Right token cancels
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/v1/batch-enrichment/{job_id}/cancel"))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], json!("CANCELLED"));
    }
}

#[tokio::test]
async fn test_refresh_outside_window_is_400() {
    let base = spawn_mock_server(mock_providers(Duration::ZERO)).await;
    let app = build_router(test_state(test_config(&base)).await);

    let data = launch(&app, json!(["9780439708180"])).await;

    // A fresh 2h token is far outside the 30min refresh window
    let response = app
        .oneshot(post_json(
            "/api/token/refresh",
            json!({
                "jobId": data["jobId"],
                "token": data["authToken"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_with_wrong_token_is_401() {
    let base = spawn_mock_server(mock_providers(Duration::ZERO)).await;
    let app = build_router(test_state(test_config(&base)).await);

    let data = launch(&app, json!(["9780439708180"])).await;

    let response = app
        .oneshot(post_json(
            "/api/token/refresh",
            json!({
                "jobId": data["jobId"],
                "token": "00000000-0000-0000-0000-000000000000",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_job_status_is_404() {
    let base = spawn_mock_server(mock_providers(Duration::ZERO)).await;
    let app = build_router(test_state(test_config(&base)).await);

    let response = app
        .oneshot(get_request(
            "/v1/batch-enrichment/00000000-0000-0000-0000-000000000000",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
