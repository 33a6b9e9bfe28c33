//! Progress stream transport
//!
//! GET /ws/progress?jobId=… upgrades to a WebSocket after validating
//! the bearer token against the job actor. The transport task forwards
//! ordered stream messages to the socket and routes client messages
//! (resume/pong/cancel) back into the actor's mailbox.

use super::bearer_token;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use libris_common::events::{ClientMessage, StreamMessage};
use libris_common::Error;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(rename = "jobId")]
    pub job_id: Uuid,
}

/// GET /ws/progress?jobId=… with `Authorization: Bearer <token>`
///
/// 101 on success; 401 for a bad token; 426 when the client never asked
/// for an upgrade.
pub async fn progress_stream(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, axum::extract::ws::rejection::WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let Ok(upgrade) = upgrade else {
        return Err(ApiError::Common(Error::UpgradeRequired));
    };

    let token = bearer_token(&headers).ok_or_else(|| {
        ApiError::Common(Error::Unauthenticated("bearer token required".to_string()))
    })?;

    // Validate and attach before upgrading so auth failures are proper
    // HTTP statuses, not post-upgrade closes.
    let rx = state.jobs.attach_stream(query.job_id, &token, None).await?;

    let job_id = query.job_id;
    tracing::info!(job_id = %job_id, "Progress stream attached");

    Ok(upgrade.on_upgrade(move |socket| run_transport(socket, state, job_id, rx)))
}

/// Pump messages between the actor and the socket until either side
/// closes or a terminal message is delivered.
async fn run_transport(
    socket: WebSocket,
    state: AppState,
    job_id: Uuid,
    mut rx: mpsc::Receiver<StreamMessage>,
) {
    let (mut sink, mut source) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        let terminal = message.is_terminal();
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::warn!(job_id = %job_id, error = %e, "Unserializable stream message");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            state.jobs.client_detached(job_id).await;
                            break;
                        }
                        if terminal {
                            // Normal close after the terminal message
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    None => {
                        // Actor replaced or dropped this stream
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Pong) => state.jobs.pong(job_id).await,
                            Ok(ClientMessage::Resume { last_seq }) => {
                                match state.jobs.resume_stream(job_id, last_seq).await {
                                    Ok(new_rx) => rx = new_rx,
                                    Err(e) => {
                                        tracing::warn!(job_id = %job_id, error = %e, "Resume failed");
                                        break;
                                    }
                                }
                            }
                            Ok(ClientMessage::Cancel { token }) => {
                                match state.jobs.cancel(job_id, &token).await {
                                    Ok(_) => {
                                        // Terminal message arrives on the
                                        // outbound path and closes us
                                    }
                                    Err(e) => {
                                        tracing::warn!(job_id = %job_id, error = %e, "Stream cancel rejected");
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::debug!(job_id = %job_id, error = %e, "Unparseable client message");
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => state.jobs.pong(job_id).await,
                    Some(Ok(Message::Close(_))) | None => {
                        state.jobs.client_detached(job_id).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(job_id = %job_id, error = %e, "Stream transport error");
                        state.jobs.client_detached(job_id).await;
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(job_id = %job_id, "Progress stream transport finished");
}

/// Build progress stream routes
pub fn progress_routes() -> Router<AppState> {
    Router::new().route("/ws/progress", get(progress_stream))
}
