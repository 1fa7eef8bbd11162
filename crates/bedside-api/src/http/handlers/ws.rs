//! WebSocket handler for a practice session's real-time channel.
//!
//! `/ws/sessions/{id}?token=...&last_seq=...` authenticates with the join
//! token issued at creation and binds the socket to the session before the
//! upgrade, so a bad token or unknown session gets an HTTP error instead of
//! an immediately-closed socket.
//!
//! Once connected, the handler:
//!
//! - **Forwards** every envelope the multiplexer queues for this connection
//!   (replayed messages first when `last_seq` is given).
//! - **Receives** client text frames and hands them to the orchestrator.
//! - **Heartbeats**: pings at the configured interval and closes the socket
//!   once the connection has been silent for too long.
//!
//! Disconnecting does not end the session; the client may reconnect and
//! resume.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use bedside_core::SessionOrchestrator;
use bedside_core::connection::Outbound;

use crate::http::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
    #[serde(default)]
    pub last_seq: Option<u64>,
}

/// GET /ws/sessions/{id}
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<WsParams>,
) -> Result<Response, AppError> {
    let session_id = session_id
        .parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {session_id}")))?;

    let orchestrator = Arc::clone(&state.orchestrator);
    let (conn, outbound) = orchestrator
        .connect(session_id, &params.token, params.last_seq)
        .await?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            orchestrator.disconnect(conn);
            return Ok(rejection.into_response());
        }
    };
    tracing::info!(%session_id, connection_id = %conn, last_seq = ?params.last_seq, "websocket attached");

    let on_failure = Arc::clone(&orchestrator);
    Ok(ws
        .on_failed_upgrade(move |e| {
            tracing::warn!(connection_id = %conn, error = %e, "websocket upgrade failed");
            on_failure.disconnect(conn);
        })
        .on_upgrade(move |socket| handle_ws_connection(socket, orchestrator, conn, outbound))
        .into_response())
}

/// Core connection loop.
///
/// A single task owns both halves of the socket and selects between
/// outbound envelopes, inbound frames, and the heartbeat tick.
async fn handle_ws_connection(
    socket: WebSocket,
    orchestrator: Arc<SessionOrchestrator>,
    conn: Uuid,
    mut outbound: Outbound,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let multiplexer = Arc::clone(orchestrator.multiplexer());

    let mut heartbeat = tokio::time::interval(orchestrator.config().connections.heartbeat());
    heartbeat.tick().await;

    loop {
        tokio::select! {
            envelope = outbound.recv() => {
                let Some(envelope) = envelope else {
                    // Session closed, or this connection fell too far behind
                    tracing::debug!(connection_id = %conn, "outbound channel closed");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                };
                match serde_json::to_string(envelope.as_ref()) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(connection_id = %conn, error = %err, "failed to serialize envelope");
                    }
                }
            }

            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        orchestrator.handle_frame(conn, text.as_str()).await;
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                        multiplexer.touch(conn);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %conn, error = %err, "websocket receive error");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        multiplexer.touch(conn);
                        tracing::debug!(connection_id = %conn, "ignoring binary frame");
                    }
                }
            }

            _ = heartbeat.tick() => {
                if multiplexer.is_stale(conn) {
                    tracing::info!(connection_id = %conn, "connection missed heartbeats, closing");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
                if ws_sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    orchestrator.disconnect(conn);
    tracing::info!(connection_id = %conn, "websocket closed");
}
