// ABOUTME: Core types and utilities for bridgekit
// ABOUTME: Provisioning data model shared by the builder, lifecycle, and agent, plus deadline polling

pub mod poll;
pub mod types;

// Re-export main types
pub use types::{
    AnalyzedSkill, BridgeAnalysis, Provisioning, SavedProvisioning, Secret, SkillRepo,
    DEFAULT_BASE_IMAGE, WORKSPACE_DIR,
};

// Re-export polling utilities
pub use poll::{poll, Clock, SystemClock};
