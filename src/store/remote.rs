use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::StateStore;
use crate::error::StoreError;
use crate::protocol::{self, MessageStream, StoreRequest, StoreResponse};

const RECONNECT_ATTEMPTS: u32 = 3;
const RECONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// Client of a `state_server`, shared by every task of one process.
///
/// Requests are serialized over a single connection. A broken connection is
/// dropped and the request retried once on a fresh one.
pub struct RemoteStore {
    addr: String,
    stream: Mutex<Option<MessageStream>>,
}

async fn open(addr: &str) -> Result<MessageStream, StoreError> {
    let tcp = TcpStream::connect(addr).await?;
    tcp.set_nodelay(true)?;
    Ok(protocol::message_stream(tcp))
}

impl RemoteStore {
    pub async fn connect(addr: &str) -> Result<Self, StoreError> {
        let stream = open(addr).await?;
        tracing::info!("[store] connected to {addr}");
        Ok(Self {
            addr: addr.to_string(),
            stream: Mutex::new(Some(stream)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn reconnect(&self) -> Result<MessageStream, StoreError> {
        let mut delay = RECONNECT_BACKOFF;
        let mut attempt = 1;
        loop {
            match open(&self.addr).await {
                Ok(stream) => {
                    tracing::info!("[store] reconnected to {}", self.addr);
                    return Ok(stream);
                }
                Err(e) if attempt >= RECONNECT_ATTEMPTS => return Err(e),
                Err(e) => {
                    tracing::warn!("[store] reconnect attempt {attempt} failed: {e}");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }

    async fn exchange(stream: &mut MessageStream, req: &StoreRequest) -> Result<StoreResponse, StoreError> {
        protocol::send_message(stream, req).await?;
        protocol::recv_message::<StoreResponse>(stream).await?.ok_or(StoreError::Closed)
    }

    async fn request(&self, req: StoreRequest) -> Result<StoreResponse, StoreError> {
        let mut guard = self.stream.lock().await;
        let mut retried = false;
        loop {
            if guard.is_none() {
                *guard = Some(self.reconnect().await?);
            }
            let Some(stream) = guard.as_mut() else {
                return Err(StoreError::Closed);
            };
            match Self::exchange(stream, &req).await {
                Ok(StoreResponse::Error(e)) => return Err(StoreError::Remote(e)),
                Ok(resp) => return Ok(resp),
                Err(e @ (StoreError::Io(_) | StoreError::Codec(_) | StoreError::Closed)) => {
                    tracing::warn!("[store] connection to {} lost: {e}", self.addr);
                    *guard = None;
                    if retried {
                        return Err(e);
                    }
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl StateStore for RemoteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.request(StoreRequest::Get { key: key.to_string() }).await? {
            StoreResponse::Value(v) => Ok(v),
            other => Err(StoreError::Remote(format!("expected Value, got {other:?}"))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let req = StoreRequest::Set {
            key: key.to_string(),
            value,
        };
        match self.request(req).await? {
            StoreResponse::Ack => Ok(()),
            other => Err(StoreError::Remote(format!("expected Ack, got {other:?}"))),
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let req = StoreRequest::CompareAndSet {
            key: key.to_string(),
            expected: expected.to_vec(),
            value,
        };
        match self.request(req).await? {
            StoreResponse::Swapped(done) => Ok(done),
            other => Err(StoreError::Remote(format!("expected Swapped, got {other:?}"))),
        }
    }
}
