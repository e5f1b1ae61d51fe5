// ABOUTME: Bridge agent: iterative provisioning until a bridge satisfies its repository
// ABOUTME: Analyzer seam, convergence predicate, monotone merge, and the fast-path/discovery state machine

pub mod agent;
pub mod analyzer;
pub mod error;
pub mod provisioning;
pub mod state;

pub use agent::{AgentOptions, BridgeAgent};
pub use bridgekit_core::WORKSPACE_DIR;
pub use analyzer::{Analyzer, StaticAnalyzer};
pub use error::{AgentError, Result};
pub use provisioning::{calculate_new_provisioning, check_provisioning_needs, resolve_skill_url};
pub use state::{AgentPhase, AgentState, Transition};
