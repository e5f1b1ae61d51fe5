// ABOUTME: Configuration management for bridgekit
// ABOUTME: Environment variable names and validated orchestrator settings

pub mod constants;
pub mod settings;

pub use settings::{default_token, BridgeSettings, ConfigError, TransportKind};
