//! Dispatcher limits, loadable from TOML.
//!
//! ```toml
//! [limits]
//! max_payload_size = 1048576
//! max_version = 2
//! ```

use codec::PROTOCOL_VERSION;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    pub limits: Limits,
}

/// Frame acceptance limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    /// Largest accepted payload, in bytes. Oversized frames are rejected
    /// at decode before any command runs.
    pub max_payload_size: usize,
    /// Highest accepted protocol version; newer versions get ERR_UNSUPP.
    pub max_version: u8,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_payload_size: 1024 * 1024,
            max_version: PROTOCOL_VERSION,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
        }
    }
}

impl DispatchConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}
