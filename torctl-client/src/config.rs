//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TORCTL_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use torctl_protocol::{WireMode, DEFAULT_CONTROL_PORT, DEFAULT_SOCKS_PORT};

/// Default request timeout (255 s).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 255_000;

/// Default connect timeout (10 s).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Settings for the control connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Control-plane host.
    pub host: String,
    /// Control-plane port.
    pub control_port: u16,
    /// Port for the SOCKS listener; `None` falls back to 9050.
    pub socks_port: Option<u16>,
    /// Default per-request deadline in milliseconds.
    pub request_timeout_ms: u64,
    /// TCP connect deadline in milliseconds.
    pub connect_timeout_ms: u64,
    /// Size of each socket read.
    pub read_buffer_size: usize,
    /// Message delimiting on the wire.
    pub wire_mode: WireMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            socks_port: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            wire_mode: WireMode::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, control_port: u16) -> Self {
        Self {
            host: host.into(),
            control_port,
            ..Self::default()
        }
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("TORCTL_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let mut config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.read_buffer_size = clamp_buffer(config.read_buffer_size);
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary key lookup. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("TOR_HOST") {
            if !host.is_empty() {
                self.host = host;
            }
        }

        if let Some(port) = lookup("TOR_CONTROL_PORT").and_then(|v| v.parse().ok()) {
            self.control_port = port;
        }

        if let Some(port) = lookup("TOR_SOCKS_PORT").and_then(|v| v.parse().ok()) {
            self.socks_port = Some(port);
        }

        if let Some(ms) = lookup("TORCTL_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.request_timeout_ms = ms;
        }

        if let Some(ms) = lookup("TORCTL_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.connect_timeout_ms = ms;
        }

        if let Some(size) = lookup("TORCTL_READ_BUFFER").and_then(|v| v.parse().ok()) {
            self.read_buffer_size = clamp_buffer(size);
        }

        if let Some(mode) = lookup("TORCTL_WIRE_MODE").and_then(|v| v.parse().ok()) {
            self.wire_mode = mode;
        }
    }

    /// Checks that the configuration can be used to open a connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Validation("host must not be empty".into()));
        }
        if self.control_port == 0 {
            return Err(ConfigError::Validation("control_port must not be 0".into()));
        }
        if self.socks_port == Some(0) {
            return Err(ConfigError::Validation("socks_port must not be 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_ms must be positive".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "connect_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Returns the `host:port` string of the control endpoint.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.control_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the configured SOCKS port or the Tor default.
    pub fn socks_port_or_default(&self) -> u16 {
        self.socks_port.unwrap_or(DEFAULT_SOCKS_PORT)
    }

    pub fn with_socks_port(mut self, port: u16) -> Self {
        self.socks_port = Some(port);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = clamp_buffer(size);
        self
    }

    pub fn with_wire_mode(mut self, mode: WireMode) -> Self {
        self.wire_mode = mode;
        self
    }
}

fn clamp_buffer(size: usize) -> usize {
    size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.control_port, 9077);
        assert_eq!(config.socks_port, None);
        assert_eq!(config.socks_port_or_default(), 9050);
        assert_eq!(config.request_timeout(), Duration::from_secs(255));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.wire_mode, WireMode::Framed);
        assert_eq!(config.address(), "localhost:9077");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = ClientConfig::default();
        config.apply_overrides(lookup_from(&[
            ("TOR_HOST", "tor-router"),
            ("TOR_CONTROL_PORT", "19077"),
            ("TOR_SOCKS_PORT", "19050"),
            ("TORCTL_REQUEST_TIMEOUT_MS", "1500"),
            ("TORCTL_WIRE_MODE", "jsonl"),
        ]));

        assert_eq!(config.address(), "tor-router:19077");
        assert_eq!(config.socks_port_or_default(), 19050);
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
        assert_eq!(config.wire_mode, WireMode::Jsonl);
    }

    #[test]
    fn test_unparseable_overrides_are_ignored() {
        let mut config = ClientConfig::default();
        config.apply_overrides(lookup_from(&[
            ("TOR_CONTROL_PORT", "not-a-port"),
            ("TORCTL_REQUEST_TIMEOUT_MS", "-5"),
            ("TORCTL_WIRE_MODE", "xml"),
            ("TOR_HOST", ""),
        ]));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_buffer_clamping() {
        let config = ClientConfig::default().with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ClientConfig::default().with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_validation() {
        let config = ClientConfig::new("localhost", 0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let config = ClientConfig::default().with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_socks_port(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host: 10.0.0.5\ncontrol_port: 9177\nsocks_port: 9150\nwire_mode: jsonl\nread_buffer_size: 10"
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.control_port, 9177);
        assert_eq!(config.socks_port, Some(9150));
        assert_eq!(config.wire_mode, WireMode::Jsonl);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);
        // Unspecified fields keep their defaults.
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_from_missing_file() {
        let result = ClientConfig::from_file("/nonexistent/torctl.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_, _))));
    }

    #[test]
    fn test_from_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "control_port: [not, a, port]").unwrap();

        let result = ClientConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_, _))));
    }
}
