// ABOUTME: Observable state of a bridge agent run
// ABOUTME: Phase, iteration counter, current provisioning, last analysis, and accumulated errors

use bridgekit_core::{BridgeAnalysis, Provisioning};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentPhase {
    Idle,
    FastPath,
    Discovering,
    Ready,
    Failed,
}

/// Why the next discovery iteration runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    /// The environment was insufficient; provisioning grew
    Rebuild,
    /// The previous attempt hit an infrastructure fault; provisioning is unchanged
    Retry,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Rebuild => write!(f, "rebuild"),
            Transition::Retry => write!(f, "retry"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub phase: AgentPhase,
    pub iteration: u32,
    pub current_provisioning: Provisioning,
    pub last_analysis: Option<BridgeAnalysis>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub is_ready: bool,
    pub errors: Vec<String>,
    /// Transitions taken between iterations, in order
    pub transitions: Vec<Transition>,
}

impl AgentState {
    pub fn new(provisioning: Provisioning) -> Self {
        Self {
            phase: AgentPhase::Idle,
            iteration: 0,
            current_provisioning: provisioning,
            last_analysis: None,
            analyzed_at: None,
            is_ready: false,
            errors: Vec::new(),
            transitions: Vec::new(),
        }
    }
}
