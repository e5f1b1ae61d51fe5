// ABOUTME: Error types for the bridge agent
// ABOUTME: Terminal causes surfaced by initialize: exhausted iterations, error budget, analysis and persistence failures

use bridgekit_lifecycle::LifecycleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Discovery used every iteration without reaching a ready bridge
    #[error("Provisioning did not converge after {iterations} iterations")]
    ProvisioningExhausted { iterations: u32 },

    #[error("Giving up after {} errors: {}", errors.len(), errors.join("; "))]
    ErrorBudgetExceeded { errors: Vec<String> },

    #[error("Bridge is not ready")]
    NotReady,

    #[error("Failed to persist provisioning: {0}")]
    Persistence(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
