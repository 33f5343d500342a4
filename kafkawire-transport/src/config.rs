//! Transport configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via KAFKAWIRE_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const MICROS_PER_SEC: u32 = 1_000_000;

/// Default host for new connections.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default broker port.
pub const DEFAULT_PORT: u16 = 9092;

/// Default receive deadline (0s + 750ms).
pub const RECV_DEADLINE: Deadline = Deadline {
    secs: 0,
    micros: 750_000,
};

/// Default send deadline (0s + 100ms).
pub const SEND_DEADLINE: Deadline = Deadline {
    secs: 0,
    micros: 100_000,
};

/// A (seconds, microseconds) wait bound.
///
/// The microsecond part is always below one second; larger values are
/// carried into the seconds part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "DeadlineParts")]
pub struct Deadline {
    secs: u64,
    micros: u32,
}

#[derive(Deserialize)]
struct DeadlineParts {
    #[serde(default)]
    secs: u64,
    #[serde(default)]
    micros: u64,
}

impl From<DeadlineParts> for Deadline {
    fn from(parts: DeadlineParts) -> Self {
        Deadline::from_micros_parts(parts.secs, parts.micros)
    }
}

impl Deadline {
    /// Creates a deadline, normalizing `micros` into `[0, 1_000_000)`.
    pub fn new(secs: u64, micros: u32) -> Self {
        Self::from_micros_parts(secs, u64::from(micros))
    }

    fn from_micros_parts(secs: u64, micros: u64) -> Self {
        let per_sec = u64::from(MICROS_PER_SEC);
        Self {
            secs: secs.saturating_add(micros / per_sec),
            micros: (micros % per_sec) as u32,
        }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn micros(&self) -> u32 {
        self.micros
    }

    /// Returns the deadline as a Duration.
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.secs) + Duration::from_micros(u64::from(self.micros))
    }
}

impl From<Duration> for Deadline {
    fn from(d: Duration) -> Self {
        Self::new(d.as_secs(), d.subsec_micros())
    }
}

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Target host.
    pub host: String,
    /// Target port (0 = unset).
    pub port: u16,
    /// Per-wait bound for read readiness.
    pub recv_deadline: Deadline,
    /// Per-wait bound for write readiness; also bounds connection setup.
    pub send_deadline: Deadline,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            recv_deadline: RECV_DEADLINE,
            send_deadline: SEND_DEADLINE,
        }
    }

    /// Placeholder configuration for transports wrapping an external handle.
    pub fn injected() -> Self {
        Self::new("localhost", 0)
    }

    pub fn with_recv_deadline(mut self, deadline: impl Into<Deadline>) -> Self {
        self.recv_deadline = deadline.into();
        self
    }

    pub fn with_send_deadline(mut self, deadline: impl Into<Deadline>) -> Self {
        self.send_deadline = deadline.into();
        self
    }

    /// Returns the connection initiation timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.send_deadline.as_duration()
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("KAFKAWIRE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Loads configuration from `path` (defaults if `None`), then applies
    /// environment variable overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: TransportConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Checks that a new connection could be dialed with this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("port must be > 0".to_string()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("KAFKAWIRE_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("KAFKAWIRE_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }

        self.recv_deadline = deadline_from_env(
            "KAFKAWIRE_RECV_TIMEOUT_SEC",
            "KAFKAWIRE_RECV_TIMEOUT_USEC",
            self.recv_deadline,
        );
        self.send_deadline = deadline_from_env(
            "KAFKAWIRE_SEND_TIMEOUT_SEC",
            "KAFKAWIRE_SEND_TIMEOUT_USEC",
            self.send_deadline,
        );
    }
}

fn deadline_from_env(secs_var: &str, micros_var: &str, current: Deadline) -> Deadline {
    let secs = std::env::var(secs_var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(current.secs);
    let micros = std::env::var(micros_var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(u64::from(current.micros));
    Deadline::from_micros_parts(secs, micros)
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9092);
        assert_eq!(config.recv_deadline, Deadline::new(0, 750_000));
        assert_eq!(config.send_deadline, Deadline::new(0, 100_000));
        assert_eq!(config.connect_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_deadline_normalization() {
        let d = Deadline::new(1, 2_500_000);
        assert_eq!(d.secs(), 3);
        assert_eq!(d.micros(), 500_000);
        assert_eq!(d.as_duration(), Duration::from_millis(3_500));

        let d = Deadline::new(0, 999_999);
        assert_eq!(d.secs(), 0);
        assert_eq!(d.micros(), 999_999);

        let d = Deadline::from(Duration::from_millis(1_250));
        assert_eq!((d.secs(), d.micros()), (1, 250_000));
    }

    #[test]
    fn test_injected_placeholder() {
        let config = TransportConfig::injected();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(TransportConfig::new("broker", 9092).validate().is_ok());
        assert!(matches!(
            TransportConfig::new("", 9092).validate(),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            TransportConfig::new("broker", 0).validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_yaml_normalizes_deadlines() {
        let yaml = r#"
host: broker-1
port: 9093
recv_deadline:
  secs: 0
  micros: 1500000
send_deadline:
  micros: 200000
"#;
        let config: TransportConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.host, "broker-1");
        assert_eq!(config.port, 9093);
        assert_eq!(config.recv_deadline, Deadline::new(1, 500_000));
        assert_eq!(config.send_deadline, Deadline::new(0, 200_000));
    }

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let config: TransportConfig = serde_yaml::from_str("port: 19092").unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, 19092);
        assert_eq!(config.recv_deadline, RECV_DEADLINE);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transport.yaml");

        let config = TransportConfig::new("broker-2", 9094)
            .with_recv_deadline(Deadline::new(2, 0))
            .with_send_deadline(Duration::from_millis(300));
        config.save(&path).unwrap();

        let loaded = TransportConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let err = TransportConfig::from_file("/nonexistent/kafkawire.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
        assert!(err.to_string().contains("/nonexistent/kafkawire.yaml"));
    }
}
