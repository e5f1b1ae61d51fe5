// ABOUTME: Orchestrator settings loaded from the environment
// ABOUTME: Validates ports, timeouts, loop bounds, and transport selection with sensible defaults

use crate::constants::*;
use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid number for {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        #[source]
        source: ParseIntError,
    },
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u32),
    #[error("{name} must be at least {min}")]
    TooSmall { name: &'static str, min: u64 },
    #[error("Invalid transport: {0} (expected 'socket' or 'http')")]
    InvalidTransport(String),
}

/// Wire shape used between host and in-container server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over a raw TCP socket
    #[default]
    Socket,
    /// One JSON-RPC envelope per HTTP POST
    Http,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Socket => "socket",
            TransportKind::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "socket" | "tcp" => Ok(TransportKind::Socket),
            "http" => Ok(TransportKind::Http),
            _ => Err(ConfigError::InvalidTransport(s.to_string())),
        }
    }
}

/// Settings shared by the builder, lifecycle, and agent
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub host: String,
    pub base_port: u16,
    pub transport: TransportKind,
    pub startup_timeout: Duration,
    pub ready_timeout: Duration,
    pub health_timeout: Duration,
    pub poll_interval: Duration,
    pub max_iterations: u32,
    pub error_budget: usize,
    pub server_binary: PathBuf,
    pub cache_volume: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 7100,
            transport: TransportKind::Socket,
            startup_timeout: Duration::from_secs(600),
            ready_timeout: Duration::from_secs(60),
            health_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
            max_iterations: 10,
            error_budget: 3,
            server_binary: default_server_binary(),
            cache_volume: "bridgekit-package-cache".to_string(),
        }
    }
}

impl BridgeSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = env::var(BRIDGEKIT_HOST).unwrap_or(defaults.host);

        let base_port = match read_number(BRIDGEKIT_BASE_PORT)? {
            Some(port) if port == 0 || port > u16::MAX as u64 => {
                return Err(ConfigError::PortOutOfRange(port as u32))
            }
            Some(port) => port as u16,
            None => defaults.base_port,
        };

        let transport = match env::var(BRIDGEKIT_TRANSPORT) {
            Ok(value) => value.parse()?,
            Err(_) => defaults.transport,
        };

        let startup_timeout = read_secs(BRIDGEKIT_STARTUP_TIMEOUT_SECS, 1)?
            .unwrap_or(defaults.startup_timeout);
        let ready_timeout =
            read_secs(BRIDGEKIT_READY_TIMEOUT_SECS, 1)?.unwrap_or(defaults.ready_timeout);
        let health_timeout =
            read_secs(BRIDGEKIT_HEALTH_TIMEOUT_SECS, 1)?.unwrap_or(defaults.health_timeout);

        let poll_interval = match read_number(BRIDGEKIT_POLL_INTERVAL_MS)? {
            Some(0) => {
                return Err(ConfigError::TooSmall {
                    name: BRIDGEKIT_POLL_INTERVAL_MS,
                    min: 1,
                })
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.poll_interval,
        };

        let max_iterations = match read_number(BRIDGEKIT_MAX_ITERATIONS)? {
            Some(0) => {
                return Err(ConfigError::TooSmall {
                    name: BRIDGEKIT_MAX_ITERATIONS,
                    min: 1,
                })
            }
            Some(n) => n.min(u32::MAX as u64) as u32,
            None => defaults.max_iterations,
        };

        let error_budget = match read_number(BRIDGEKIT_ERROR_BUDGET)? {
            Some(0) => {
                return Err(ConfigError::TooSmall {
                    name: BRIDGEKIT_ERROR_BUDGET,
                    min: 1,
                })
            }
            Some(n) => n as usize,
            None => defaults.error_budget,
        };

        let server_binary = env::var(BRIDGEKIT_SERVER_BINARY)
            .map(PathBuf::from)
            .unwrap_or(defaults.server_binary);

        let cache_volume = env::var(BRIDGEKIT_CACHE_VOLUME)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.cache_volume);

        let settings = Self {
            host,
            base_port,
            transport,
            startup_timeout,
            ready_timeout,
            health_timeout,
            poll_interval,
            max_iterations,
            error_budget,
            server_binary,
            cache_volume,
        };
        debug!("Loaded bridge settings: {:?}", settings);
        Ok(settings)
    }
}

/// Read the well-known default token from the process environment
pub fn default_token() -> Option<String> {
    env::var(GITHUB_TOKEN).ok().filter(|t| !t.is_empty())
}

fn default_server_binary() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("bridgekit-server")))
        .unwrap_or_else(|| PathBuf::from("bridgekit-server"))
}

fn read_number(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|source| ConfigError::InvalidNumber { name, source }),
        Err(_) => Ok(None),
    }
}

fn read_secs(name: &'static str, min: u64) -> Result<Option<Duration>, ConfigError> {
    match read_number(name)? {
        Some(secs) if secs < min => Err(ConfigError::TooSmall { name, min }),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            BRIDGEKIT_HOST,
            BRIDGEKIT_BASE_PORT,
            BRIDGEKIT_TRANSPORT,
            BRIDGEKIT_STARTUP_TIMEOUT_SECS,
            BRIDGEKIT_READY_TIMEOUT_SECS,
            BRIDGEKIT_HEALTH_TIMEOUT_SECS,
            BRIDGEKIT_POLL_INTERVAL_MS,
            BRIDGEKIT_MAX_ITERATIONS,
            BRIDGEKIT_ERROR_BUDGET,
            BRIDGEKIT_SERVER_BINARY,
            BRIDGEKIT_CACHE_VOLUME,
            GITHUB_TOKEN,
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_environment() {
        clear_env();
        let settings = BridgeSettings::from_env().unwrap();

        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.base_port, 7100);
        assert_eq!(settings.transport, TransportKind::Socket);
        assert_eq!(settings.max_iterations, 10);
        assert_eq!(settings.error_budget, 3);
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.cache_volume, "bridgekit-package-cache");
    }

    #[test]
    #[serial]
    fn test_overrides_from_environment() {
        clear_env();
        env::set_var(BRIDGEKIT_BASE_PORT, "9000");
        env::set_var(BRIDGEKIT_TRANSPORT, "http");
        env::set_var(BRIDGEKIT_STARTUP_TIMEOUT_SECS, "120");
        env::set_var(BRIDGEKIT_MAX_ITERATIONS, "4");
        env::set_var(BRIDGEKIT_SERVER_BINARY, "/usr/local/bin/bridgekit-server");

        let settings = BridgeSettings::from_env().unwrap();
        clear_env();

        assert_eq!(settings.base_port, 9000);
        assert_eq!(settings.transport, TransportKind::Http);
        assert_eq!(settings.startup_timeout, Duration::from_secs(120));
        assert_eq!(settings.max_iterations, 4);
        assert_eq!(
            settings.server_binary,
            PathBuf::from("/usr/local/bin/bridgekit-server")
        );
    }

    #[rstest]
    #[case(BRIDGEKIT_BASE_PORT, "0")]
    #[case(BRIDGEKIT_BASE_PORT, "70000")]
    #[case(BRIDGEKIT_BASE_PORT, "not-a-port")]
    #[case(BRIDGEKIT_POLL_INTERVAL_MS, "0")]
    #[case(BRIDGEKIT_MAX_ITERATIONS, "0")]
    #[case(BRIDGEKIT_ERROR_BUDGET, "0")]
    #[case(BRIDGEKIT_TRANSPORT, "carrier-pigeon")]
    #[serial]
    fn test_invalid_values_are_rejected(#[case] name: &str, #[case] value: &str) {
        clear_env();
        env::set_var(name, value);
        let result = BridgeSettings::from_env();
        clear_env();

        assert!(result.is_err(), "{}={} should be rejected", name, value);
    }

    #[test]
    #[serial]
    fn test_default_token_ignores_empty_value() {
        clear_env();
        env::set_var(GITHUB_TOKEN, "");
        assert_eq!(default_token(), None);

        env::set_var(GITHUB_TOKEN, "ghp_token");
        assert_eq!(default_token(), Some("ghp_token".to_string()));
        clear_env();
    }

    #[rstest]
    #[case("socket", TransportKind::Socket)]
    #[case("TCP", TransportKind::Socket)]
    #[case(" http ", TransportKind::Http)]
    fn test_transport_kind_parsing(#[case] input: &str, #[case] expected: TransportKind) {
        assert_eq!(input.parse::<TransportKind>().unwrap(), expected);
    }
}
