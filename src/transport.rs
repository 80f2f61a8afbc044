//! Transport seam and the WebSocket implementation.
//!
//! DESIGN
//! ======
//! The engine sees a transport as an opaque duplex message channel:
//! - `Connector::connect` resolving is the "open" signal, failing is "error".
//! - `Transport::recv` yielding `None` is the "close" signal.
//!
//! Tests swap in an in-memory connector; production uses `WsConnector`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::TransportError;

/// Opens transports. One call per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// An open duplex message channel.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Next inbound message. `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the engine polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>>;

    async fn close(&mut self);
}

// =============================================================================
// WEBSOCKET
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        // Requests are JSON, so this is a text message unless a caller hands
        // us raw bytes.
        let message = match String::from_utf8(frame) {
            Ok(text) => Message::Text(text.into()),
            Err(error) => Message::Binary(error.into_bytes().into()),
        };
        self.stream
            .send(message)
            .await
            .map_err(|error| TransportError::Send(error.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_bytes().to_vec())),
                Ok(Message::Binary(bytes)) => return Some(Ok(bytes.to_vec())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "ws: close frame received");
                    return None;
                }
                Ok(_) => {}
                Err(error) => return Some(Err(TransportError::Receive(error.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(error) = self.stream.close(None).await {
            tracing::debug!(%error, "ws: close handshake failed");
        }
    }
}
