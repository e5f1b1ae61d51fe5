// ABOUTME: Error types for in-container request handling
// ABOUTME: Every handler error maps onto a JSON-RPC error code at the dispatch boundary

use bridgekit_protocol::RpcError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Path is outside the workspace and install roots: {0}")]
    OutsideRoots(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ServerError> for RpcError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::OutsideRoots(_) | ServerError::InvalidParams(_) => {
                RpcError::invalid_params(err.to_string())
            }
            _ => RpcError::internal(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
