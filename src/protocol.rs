//! TCP protocol between lamp processes and the shared state server.
//!
//! Self-contained: only the store error type is imported.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::StoreError;

/// Debug frames are the largest values stored.
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

// --- Message types ---

/// Client → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum StoreRequest {
    Get { key: String },
    Set { key: String, value: Vec<u8> },
    CompareAndSet { key: String, expected: Vec<u8>, value: Vec<u8> },
}

/// Server → client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum StoreResponse {
    Value(Option<Vec<u8>>),
    Ack,
    Swapped(bool),
    Error(String),
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> Result<(), StoreError> {
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message. `Ok(None)` when the peer hung up.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> Result<Option<T>, StoreError> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bincode_shape() {
        let req = StoreRequest::Set {
            key: "potterlamp:lamp".to_string(),
            value: b"on".to_vec(),
        };
        let bytes = bincode::serialize(&req).unwrap();
        let back: StoreRequest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, req);
    }

    #[tokio::test]
    async fn test_framed_exchange() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut stream = message_stream(tcp);
            let req: StoreRequest = recv_message(&mut stream).await.unwrap().unwrap();
            assert_eq!(req, StoreRequest::Get { key: "k".to_string() });
            send_message(&mut stream, &StoreResponse::Value(None)).await.unwrap();
        });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let mut stream = message_stream(tcp);
        send_message(&mut stream, &StoreRequest::Get { key: "k".to_string() })
            .await
            .unwrap();
        let resp: Option<StoreResponse> = recv_message(&mut stream).await.unwrap();
        assert_eq!(resp, Some(StoreResponse::Value(None)));
        server.await.unwrap();
    }
}
