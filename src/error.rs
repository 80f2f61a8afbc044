//! Error types surfaced to callers.

/// Failure reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),
    /// Writing a frame to an open transport failed.
    #[error("send failed: {0}")]
    Send(String),
    /// Reading from an open transport failed.
    #[error("receive failed: {0}")]
    Receive(String),
    /// The connection went away before the call was answered.
    #[error("connection closed")]
    Closed,
}

/// Error returned by [`Client`](crate::Client) operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Open, send or receive failure, or the connection dropped mid-call.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// An inbound frame was malformed.
    #[error("frame decode failed: {0}")]
    Decode(#[from] frames::DecodeError),
    /// The server answered with `type: "error"`.
    #[error("server returned error for {kind} ({request_id}): {message}")]
    Remote {
        request_id: String,
        kind: String,
        message: String,
    },
    /// No reply arrived before the call's deadline.
    #[error("request {request_id} ({kind}) timed out after {timeout_secs}s")]
    Timeout {
        request_id: String,
        kind: String,
        timeout_secs: u64,
    },
    /// A call was issued while no transport was open.
    #[error("websocket not connected")]
    NotConnected,
    /// The client was destroyed before or during the operation.
    #[error("client is destroyed")]
    Destroyed,
    /// Retrying stopped after `attempts` consecutive failures. Non-fatal.
    #[error("max reconnect attempts ({attempts}) reached")]
    MaxReconnectAttempts { attempts: u32 },
    /// Call params did not serialize to a JSON object.
    #[error("request params must serialize to a JSON object")]
    InvalidParams,
    /// Params or a typed reply failed to (de)serialize.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// A typed call got a hybrid (binary) reply.
    #[error("expected a JSON reply, got {len} bytes of binary data")]
    UnexpectedBinary { len: usize },
}
