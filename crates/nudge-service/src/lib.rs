//! The nudge server: core request handlers behind a shared service trait,
//! JSON-RPC over loopback HTTP, a stdin/stdout tool channel, and the
//! single-instance election that decides between PRIMARY and PROXY mode.

use std::sync::Arc;

use tracing::info;

pub mod http;
pub mod lock;
pub mod proxy;
pub mod service;
pub mod stdio;
pub mod tools;

pub use lock::{LockError, ServerLock};
pub use proxy::ProxyService;
pub use service::CoreService;

use nudge::rpc::HintService;

pub const DEFAULT_PORT: u16 = 8765;

/// Start serving: become PRIMARY if no live server holds the lock,
/// otherwise demote to PROXY forwarding to the recorded port.
pub async fn serve(requested_port: u16) -> anyhow::Result<()> {
    let lock = ServerLock::new();
    match lock.check_running() {
        (true, Some(primary_port)) => run_proxy(primary_port).await,
        // A live legacy record without a port cannot be forwarded to; fall
        // through and let lock acquisition report the conflict.
        _ => run_primary(requested_port, lock).await,
    }
}

/// PRIMARY mode: own the store, serve HTTP JSON-RPC and the tool channel
/// concurrently, hold the PID-file lock until shutdown.
pub async fn run_primary(requested_port: u16, lock: ServerLock) -> anyhow::Result<()> {
    let service: Arc<dyn HintService> = Arc::new(CoreService::from_env());

    let (listener, port) = http::bind(requested_port).await?;
    lock.acquire(port)?;
    info!(port, pid = std::process::id(), "PRIMARY server started");

    let app = http::router(service.clone());
    let result = tokio::select! {
        res = async { axum::serve(listener, app).await } => res.map_err(Into::into),
        res = stdio::run(service) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    };

    lock.release();
    info!("server stopped");
    result
}

/// PROXY mode: no store; the tool channel forwards every call to the
/// PRIMARY.
pub async fn run_proxy(primary_port: u16) -> anyhow::Result<()> {
    info!(
        primary_port,
        pid = std::process::id(),
        "PROXY mode, forwarding to PRIMARY"
    );
    let service: Arc<dyn HintService> = Arc::new(ProxyService::new(primary_port));
    tokio::select! {
        res = stdio::run(service) => res,
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}
