//! Shared state server.
//!
//! Usage: state_server [addr]   (default 127.0.0.1:6390)
//!
//! Every lamp process pointing `[store] remote` here sees the same session
//! flag, action token and color.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;

use wandlight::logging;
use wandlight::store::{server, MemoryStore};

const DEFAULT_ADDR: &str = "127.0.0.1:6390";

#[tokio::main]
async fn main() -> Result<()> {
    let log_path = logging::init("state_server")?;
    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    tracing::info!(version = env!("GIT_VERSION"), log = %log_path.display(), "state server starting");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("[server] listening on {addr}");

    let store = Arc::new(MemoryStore::new());
    tokio::select! {
        result = server::serve(listener, store) => result.context("server stopped")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("[server] interrupted"),
    }
    Ok(())
}
