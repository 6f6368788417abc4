//! Configuration loading for wristlink devices.
//!
//! Configuration is loaded from an optional TOML file. Every section and
//! field has a default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for a telemetry node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkConfig {
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Motion sampler configuration.
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Peer link configuration.
    #[serde(default)]
    pub link: PeerConfig,
    /// Tracking-state replication configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Which side of the pair this process runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// The wrist device: forwards its samples to the counterpart.
    Wearable,
    /// The phone: aggregates its own samples locally.
    #[default]
    Handheld,
}

/// Device configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    /// Role of this device (default: handheld).
    #[serde(default)]
    pub role: DeviceRole,
}

/// Motion sampler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    /// Sampling period in milliseconds (default: 10).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Peer link configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    /// Maximum accepted sends waiting for delivery (default: 64).
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// Re-activate automatically when the platform drops the session
    /// (default: true).
    #[serde(default = "default_reactivate")]
    pub reactivate_on_deactivation: bool,
}

/// Tracking-state replication configuration.
///
/// Both options are off by default, which leaves plain last-writer-wins
/// with no repair of lost updates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Push the local tracking value whenever the counterpart becomes
    /// reachable (default: false).
    #[serde(default)]
    pub resync_on_reconnect: bool,
    /// Push the local tracking value every N milliseconds while reachable
    /// (default: disabled).
    #[serde(default)]
    pub anti_entropy_interval_ms: Option<u64>,
}

// Default value functions
fn default_interval_ms() -> u64 {
    10
}

fn default_outbox_capacity() -> usize {
    64
}

fn default_reactivate() -> bool {
    true
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: default_outbox_capacity(),
            reactivate_on_deactivation: default_reactivate(),
        }
    }
}

impl SamplerConfig {
    /// Sampling period as a duration.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl SyncConfig {
    /// Anti-entropy period, if enabled.
    pub fn anti_entropy_period(&self) -> Option<Duration> {
        self.anti_entropy_interval_ms.map(Duration::from_millis)
    }
}

impl LinkConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the node.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sampler.interval_ms must be greater than 0".into(),
            ));
        }
        if self.link.outbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "link.outbox_capacity must be greater than 0".into(),
            ));
        }
        if self.sync.anti_entropy_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "sync.anti_entropy_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
