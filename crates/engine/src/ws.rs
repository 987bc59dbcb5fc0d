//! WebSocket event channel: upgrade, per-session writer task, and
//! inbound frame handling.
//!
//! Each session owns one bounded outbound queue; this module attaches a
//! single writer task that drains it onto the socket. Clients may also
//! submit JSON-RPC requests over the socket and receive `rpc_response`
//! frames back in-stream.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use grimbox_domain::SessionId;
use grimbox_protocol::{RpcRequest, WsFrame};

use crate::rpc;
use crate::session::Session;
use crate::state::Engine;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub session_id: String,
}

/// WebSocket upgrade handler; the session must already exist (joinGame
/// happens over `POST /rpc`).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(engine): State<Arc<Engine>>,
) -> impl IntoResponse {
    let session = query
        .session_id
        .parse::<SessionId>()
        .ok()
        .and_then(|id| engine.sessions.authenticate(id).ok());

    match session {
        Some(session) => {
            ws.on_upgrade(move |socket| handle_socket(socket, engine, session))
                .into_response()
        }
        None => (
            axum::http::StatusCode::UNAUTHORIZED,
            "unknown or expired session",
        )
            .into_response(),
    }
}

async fn handle_socket(socket: WebSocket, engine: Arc<Engine>, session: Arc<Session>) {
    tracing::info!(session = %session.id, "websocket attached");
    session.ws_connected.store(true, Ordering::Release);

    let (mut sink, mut stream) = socket.split();

    // writer: drain the bounded queue onto the socket
    let send_failed = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let writer_session = session.clone();
    let writer_failed = send_failed.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = writer_session.outbound.next().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(%err, "frame serialization failed");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                writer_failed.store(true, Ordering::Release);
                return;
            }
        }
    });

    // reader: heartbeat pings and in-stream RPC requests
    let mut socket_failed = false;
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<RpcRequest>(&text) {
                Ok(request) => {
                    let response = rpc::dispatch(&engine, request).await;
                    match serde_json::to_value(&response) {
                        Ok(value) => session.outbound.push(WsFrame::rpc_response(value)),
                        Err(err) => tracing::error!(%err, "response serialization failed"),
                    }
                }
                Err(err) => {
                    session
                        .outbound
                        .push(WsFrame::error(format!("unparseable frame: {err}"), None));
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // liveness only; axum answers pings at the protocol layer
                session.touch(chrono::Utc::now(), engine.sessions.timeout());
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                session
                    .outbound
                    .push(WsFrame::error("binary frames are not supported", None));
            }
            Err(err) => {
                tracing::warn!(session = %session.id, %err, "websocket read error");
                socket_failed = true;
                break;
            }
        }
    }

    session.ws_connected.store(false, Ordering::Release);
    writer.abort();

    // an unusable socket terminates the session asynchronously; a clean
    // close leaves it to expire via TTL so the client can reconnect
    if socket_failed || send_failed.load(Ordering::Acquire) {
        tracing::info!(session = %session.id, "terminating session after socket failure");
        engine.end_session(&session, "websocket failed").await;
    } else {
        tracing::debug!(session = %session.id, "websocket detached");
    }
}
