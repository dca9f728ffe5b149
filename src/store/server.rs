//! State server: one [`MemoryStore`] shared by every connected process.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use super::{MemoryStore, StateStore};
use crate::error::StoreError;
use crate::protocol::{self, StoreRequest, StoreResponse};

/// Accept clients forever, one task per connection.
pub async fn serve(listener: TcpListener, store: Arc<MemoryStore>) -> Result<(), StoreError> {
    loop {
        let (tcp, addr) = listener.accept().await?;
        tcp.set_nodelay(true)?;
        tracing::info!("[server] client connected: {addr}");
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            match handle_client(tcp, store).await {
                Ok(()) => tracing::info!("[server] client disconnected: {addr}"),
                Err(e) => tracing::warn!("[server] client {addr}: {e}"),
            }
        });
    }
}

async fn handle_client(tcp: TcpStream, store: Arc<MemoryStore>) -> Result<(), StoreError> {
    let mut stream = protocol::message_stream(tcp);
    while let Some(req) = protocol::recv_message::<StoreRequest>(&mut stream).await? {
        let resp = match req {
            StoreRequest::Get { key } => match store.get(&key).await {
                Ok(v) => StoreResponse::Value(v),
                Err(e) => StoreResponse::Error(e.to_string()),
            },
            StoreRequest::Set { key, value } => match store.set(&key, value).await {
                Ok(()) => StoreResponse::Ack,
                Err(e) => StoreResponse::Error(e.to_string()),
            },
            StoreRequest::CompareAndSet { key, expected, value } => {
                match store.compare_and_set(&key, &expected, value).await {
                    Ok(done) => StoreResponse::Swapped(done),
                    Err(e) => StoreResponse::Error(e.to_string()),
                }
            }
        };
        protocol::send_message(&mut stream, &resp).await?;
    }
    Ok(())
}
