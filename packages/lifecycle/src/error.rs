// ABOUTME: Error types for bridge lifecycle operations
// ABOUTME: Build failures, startup timeouts, and health failures surfaced by createBridge

use bridgekit_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Bridge not found: {0}")]
    NotFound(String),

    #[error("Bridge already exists: {0}")]
    AlreadyExists(String),

    /// The build unit reported an error
    #[error("Build failed: {0}")]
    Build(String),

    #[error("Bridge {id} did not start within {seconds} seconds")]
    StartupTimeout { id: String, seconds: u64 },

    /// Builder reported ready but the bridge failed the orchestrator's own health poll
    #[error("Bridge {0} is not healthy")]
    Unhealthy(String),

    /// The build unit exited without a ready or error signal
    #[error("Build unit for bridge {0} ended without a result")]
    BuildUnitLost(String),

    #[error("No free ports left above {0}")]
    PortsExhausted(u16),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
