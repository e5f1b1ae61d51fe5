// ABOUTME: Error types for host-to-bridge transport and RPC calls
// ABOUTME: Covers connection state, framing, RPC-level failures, and timeouts

use bridgekit_protocol::{FrameError, RpcError};
use thiserror::Error;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport is not connected
    #[error("Transport is not connected")]
    NotConnected,

    /// Connection could not be established
    #[error("Failed to connect to {addr} after {attempts} attempts: {message}")]
    ConnectFailed {
        addr: String,
        attempts: u32,
        message: String,
    },

    /// Connection dropped while a request was in flight
    #[error("Connection closed: {0}")]
    Disconnected(String),

    /// Malformed frame or envelope
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered with a JSON-RPC error
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// No response within the request timeout
    #[error("Request {method} timed out after {seconds} seconds")]
    Timeout { method: String, seconds: u64 },

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

/// Type alias for Results that return ClientError
pub type Result<T> = std::result::Result<T, ClientError>;
