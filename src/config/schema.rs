//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! Every section has defaults, so an empty file is a valid configuration.

use super::error::{ConfigError, ConfigResult};
use crate::relay::{RelaySetup, DEFAULT_CHANNEL_CAPACITY};
use crate::worker::DEFAULT_READ_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Relay engine tuning
    pub relay: RelayConfig,
    /// Relay pairs to start, in order
    #[serde(rename = "pair", skip_serializing_if = "Vec::is_empty")]
    pub pairs: Vec<RelaySetup>,
}

impl Config {
    /// Check values that would otherwise only fail once the relay runs.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.relay.channel_capacity == 0 {
            return Err(ConfigError::validation(
                "relay.channel_capacity",
                "must be at least 1",
            ));
        }
        if self.relay.read_chunk_size == 0 {
            return Err(ConfigError::validation(
                "relay.read_chunk_size",
                "must be at least 1",
            ));
        }
        if self.relay.supervise_interval_ms == 0 {
            return Err(ConfigError::validation(
                "relay.supervise_interval_ms",
                "must be at least 1",
            ));
        }
        for (i, pair) in self.pairs.iter().enumerate() {
            if pair.source.port_id.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("pair[{i}].source.port_id"),
                    "is required",
                ));
            }
            if pair.destination.port_id.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("pair[{i}].destination.port_id"),
                    "is required",
                ));
            }
        }
        Ok(())
    }
}

/// Relay engine configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Chunks buffered between a reader and its writer
    pub channel_capacity: usize,
    /// Bytes requested per device read
    pub read_chunk_size: usize,
    /// How often the binary checks pairs for failures
    pub supervise_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            supervise_interval_ms: 1000,
        }
    }
}

impl RelayConfig {
    pub fn supervise_interval(&self) -> Duration {
        Duration::from_millis(self.supervise_interval_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "serial_relay=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}
