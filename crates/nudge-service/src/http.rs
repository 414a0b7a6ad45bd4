//! The HTTP JSON-RPC channel: `POST /` for requests, `GET /health` for the
//! liveness probe. Loopback only; the port auto-increments from the
//! requested one when taken.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get, routing::post};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::debug;

use nudge::rpc::{self, HintService, RpcRequest, RpcResponse};

const BIND_ATTEMPTS: u16 = 10;

type SharedService = Arc<dyn HintService>;

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn handle_rpc(
    State(service): State<SharedService>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    debug!(method = %request.method, "rpc request");
    let response = match rpc::dispatch(service.as_ref(), &request.method, request.params).await {
        Ok(result) => RpcResponse::success(result, request.id),
        Err(error) => RpcResponse::failure(error, request.id),
    };
    Json(response)
}

async fn handle_health() -> Json<Value> {
    Json(json!({"status": "ok", "pid": std::process::id()}))
}

/// Bind the loopback listener, walking up from `requested_port` for up to
/// ten attempts. Returns the listener and the port actually bound.
pub async fn bind(requested_port: u16) -> anyhow::Result<(TcpListener, u16)> {
    for offset in 0..BIND_ATTEMPTS {
        let port = requested_port + offset;
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) => {
                debug!(port, %err, "port unavailable, trying next");
            }
        }
    }
    anyhow::bail!(
        "Could not bind to any port from {requested_port} to {}",
        requested_port + BIND_ATTEMPTS - 1
    )
}
