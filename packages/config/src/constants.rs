// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across bridgekit

// Orchestrator networking
pub const BRIDGEKIT_HOST: &str = "BRIDGEKIT_HOST";
pub const BRIDGEKIT_BASE_PORT: &str = "BRIDGEKIT_BASE_PORT";
pub const BRIDGEKIT_TRANSPORT: &str = "BRIDGEKIT_TRANSPORT";

// Timeouts and polling
pub const BRIDGEKIT_STARTUP_TIMEOUT_SECS: &str = "BRIDGEKIT_STARTUP_TIMEOUT_SECS";
pub const BRIDGEKIT_READY_TIMEOUT_SECS: &str = "BRIDGEKIT_READY_TIMEOUT_SECS";
pub const BRIDGEKIT_HEALTH_TIMEOUT_SECS: &str = "BRIDGEKIT_HEALTH_TIMEOUT_SECS";
pub const BRIDGEKIT_POLL_INTERVAL_MS: &str = "BRIDGEKIT_POLL_INTERVAL_MS";

// Discovery loop
pub const BRIDGEKIT_MAX_ITERATIONS: &str = "BRIDGEKIT_MAX_ITERATIONS";
pub const BRIDGEKIT_ERROR_BUDGET: &str = "BRIDGEKIT_ERROR_BUDGET";

// Container build
pub const BRIDGEKIT_SERVER_BINARY: &str = "BRIDGEKIT_SERVER_BINARY";
pub const BRIDGEKIT_CACHE_VOLUME: &str = "BRIDGEKIT_CACHE_VOLUME";

// Well-known default token, used when the caller supplies no token secret
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";

// In-container server
pub const BRIDGE_HOST: &str = "BRIDGE_HOST";
pub const BRIDGE_PORT: &str = "BRIDGE_PORT";
pub const BRIDGE_WORKSPACE: &str = "BRIDGE_WORKSPACE";
pub const BRIDGE_INSTALL_ROOT: &str = "BRIDGE_INSTALL_ROOT";
pub const BRIDGE_TRANSPORT: &str = "BRIDGE_TRANSPORT";
