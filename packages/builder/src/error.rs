// ABOUTME: Error types for container builds
// ABOUTME: Every variant is fatal to the current build attempt; retrying is the caller's decision

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    /// Docker daemon or API failure
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Base image pull or image build failure
    #[error("Image error: {0}")]
    Image(String),

    /// The post-start validation command failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The server never answered the handshake
    #[error("Bridge server not ready after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The container stopped while waiting for readiness
    #[error("Container exited during startup: {0}")]
    Crashed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
