//! Controller Configuration Module
//!
//! Provides configuration loading and validation for the controller service.
//! Supports loading from TOML files with environment variable overrides.

use anyhow::{Context, Result};
use codec::IMPLEMENTED_VERSIONS;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable prefix used by the binary
pub const DEFAULT_ENV_PREFIX: &str = "OFCTL";

/// Configuration-time errors; these abort startup
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No OpenFlow version configured")]
    NoVersions,

    #[error("OpenFlow version {version} is not implemented (implemented: {implemented:?})")]
    UnsupportedVersion { version: u8, implemented: Vec<u8> },

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main controller configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub listen: ListenSettings,
    pub protocol: ProtocolSettings,
    pub correlation: CorrelationSettings,
    pub handshake: HandshakeSettings,
    pub keepalive: KeepaliveSettings,
    pub bus: BusSettings,
}

/// TCP listener address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: codec::OFP_TCP_PORT,
        }
    }
}

/// Wire protocol limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Accepted OpenFlow wire versions
    pub versions: Vec<u8>,
    /// Largest frame accepted from a switch
    pub max_message_size: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            versions: IMPLEMENTED_VERSIONS.to_vec(),
            max_message_size: u16::MAX as usize,
        }
    }
}

/// Xid correlation timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationSettings {
    /// Multiplier applied to the latency estimate
    pub timeout_factor: f64,
    /// Timeout used before any round trip has been measured
    pub default_timeout_ms: u64,
    /// Lower bound on a latency-derived timeout
    pub min_timeout_ms: u64,
    /// Policy for callers that do not choose one
    pub fail_open: bool,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            timeout_factor: 1.5,
            default_timeout_ms: 3000,
            min_timeout_ms: 100,
            fail_open: true,
        }
    }
}

impl CorrelationSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn min_timeout(&self) -> Duration {
        Duration::from_millis(self.min_timeout_ms)
    }

    /// Timeout for one correlated request given the connection's latency estimate
    pub fn timeout_for(&self, latency: Option<Duration>) -> Duration {
        match latency {
            Some(estimate) => estimate
                .mul_f64(self.timeout_factor)
                .max(self.min_timeout()),
            None => self.default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeSettings {
    pub fail_open: bool,
}

/// Liveness probing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveSettings {
    pub interval_ms: u64,
    pub max_missed: u32,
    pub fail_open: bool,
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_missed: 3,
            fail_open: false,
        }
    }
}

impl KeepaliveSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Event bus limits and RPC surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub subscriber_capacity: usize,
    pub rpc_timeout_ms: u64,
    pub enable_rpc: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            subscriber_capacity: 1024,
            rpc_timeout_ms: 5000,
            enable_rpc: true,
        }
    }
}

impl BusSettings {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl ControllerConfig {
    /// Load configuration from an optional file with environment overrides
    pub fn load(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading controller config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        // OFCTL_KEEPALIVE__INTERVAL_MS=500
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("protocol.versions"),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        debug!(?config, "Controller configuration loaded");
        Ok(config)
    }

    /// Load configuration from a TOML file only
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.versions.is_empty() {
            return Err(ConfigError::NoVersions);
        }

        for version in &self.protocol.versions {
            if !IMPLEMENTED_VERSIONS.contains(version) {
                return Err(ConfigError::UnsupportedVersion {
                    version: *version,
                    implemented: IMPLEMENTED_VERSIONS.to_vec(),
                });
            }
        }

        if self.protocol.max_message_size < codec::OFP_HEADER_SIZE {
            return Err(ConfigError::invalid(
                "protocol.max_message_size",
                "must hold at least the 8-byte header",
            ));
        }

        if !(self.correlation.timeout_factor > 0.0) {
            return Err(ConfigError::invalid(
                "correlation.timeout_factor",
                "must be > 0",
            ));
        }

        if self.correlation.default_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "correlation.default_timeout_ms",
                "must be > 0",
            ));
        }

        if self.keepalive.interval_ms == 0 {
            return Err(ConfigError::invalid("keepalive.interval_ms", "must be > 0"));
        }

        if self.keepalive.max_missed == 0 {
            return Err(ConfigError::invalid("keepalive.max_missed", "must be > 0"));
        }

        if self.bus.subscriber_capacity == 0 {
            return Err(ConfigError::invalid(
                "bus.subscriber_capacity",
                "must be > 0",
            ));
        }

        Ok(())
    }

    /// `host:port` the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr(), "127.0.0.1:6653");
        assert_eq!(config.protocol.versions, vec![4, 6]);
        assert_eq!(config.correlation.timeout_factor, 1.5);
        assert!(config.correlation.fail_open);
        assert!(!config.handshake.fail_open);
        assert!(!config.keepalive.fail_open);
        assert_eq!(config.keepalive.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_timeout_for() {
        let settings = CorrelationSettings::default();
        assert_eq!(settings.timeout_for(None), Duration::from_secs(3));
        assert_eq!(
            settings.timeout_for(Some(Duration::from_millis(400))),
            Duration::from_millis(600)
        );
        // Sub-millisecond estimates are floored
        assert_eq!(
            settings.timeout_for(Some(Duration::from_micros(80))),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("controller.toml");

        let config_content = r#"
[listen]
host = "0.0.0.0"
port = 6633

[protocol]
versions = [4]

[keepalive]
max_missed = 5
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = ControllerConfig::from_file(&config_path).unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:6633");
        assert_eq!(config.protocol.versions, vec![4]);
        assert_eq!(config.keepalive.max_missed, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.keepalive.interval_ms, 2000);
        assert_eq!(config.bus, BusSettings::default());
    }

    #[test]
    fn test_load_with_env_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("controller.toml");
        fs::write(&config_path, "[listen]\nport = 7000\n").unwrap();

        std::env::set_var("OFCTLTEST_KEEPALIVE__INTERVAL_MS", "250");
        let config = ControllerConfig::load(Some(&config_path), "OFCTLTEST").unwrap();
        std::env::remove_var("OFCTLTEST_KEEPALIVE__INTERVAL_MS");

        assert_eq!(config.listen.port, 7000);
        assert_eq!(config.keepalive.interval_ms, 250);
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/controller.toml");
        let config = ControllerConfig::from_file(&path).unwrap();
        assert_eq!(config.listen.host, "0.0.0.0");
        assert_eq!(config.protocol, ProtocolSettings::default());
        assert_eq!(config.correlation, CorrelationSettings::default());
        assert_eq!(config.keepalive, KeepaliveSettings::default());
    }

    #[test]
    fn test_load_without_file() {
        let config = ControllerConfig::load(None, "OFCTLNOFILE").unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut config = ControllerConfig::default();
        config.protocol.versions = vec![4, 5];
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnsupportedVersion {
                version: 5,
                implemented: vec![4, 6]
            })
        );

        config.protocol.versions.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoVersions));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ControllerConfig::default();
        config.correlation.timeout_factor = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "correlation.timeout_factor", .. })
        ));

        let mut config = ControllerConfig::default();
        config.keepalive.max_missed = 0;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.keepalive.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_fails_to_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("controller.toml");
        fs::write(&config_path, "[protocol]\nversions = [1]\n").unwrap();
        assert!(ControllerConfig::from_file(&config_path).is_err());
        assert!(ControllerConfig::load(Some(&config_path), "OFCTLBAD").is_err());
    }
}
