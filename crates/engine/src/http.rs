//! HTTP surface: the single RPC endpoint, the WebSocket upgrade,
//! liveness/readiness, and the static front-end.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use grimbox_protocol::rpc::{RpcError, RpcRequest, RpcResponse, PARSE_ERROR};

use crate::rpc;
use crate::state::Engine;
use crate::ws;

/// Build the application router.
pub fn router(engine: Arc<Engine>) -> Router {
    let web_dir = engine.config.web_dir.clone();
    Router::new()
        .route("/rpc", post(rpc_endpoint))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .fallback_service(ServeDir::new(web_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// `POST /rpc`: the JSON-RPC 2.0 request/response channel. The body is
/// taken raw so malformed JSON maps to the spec's parse-error code
/// instead of a transport-level 400.
async fn rpc_endpoint(State(engine): State<Arc<Engine>>, body: String) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(err) => {
            return Json(RpcResponse::failure(
                Value::Null,
                RpcError::new(PARSE_ERROR, format!("parse error: {err}")),
            ));
        }
    };
    Json(rpc::dispatch(&engine, request).await)
}

/// Liveness: 200 once the process is serving.
async fn health() -> &'static str {
    "OK"
}

/// Readiness: 200 once persistence load or bootstrap completed.
async fn ready(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    if engine.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}
