//! Application settings

use crate::core::protocol::BusRetryPolicy;
use crate::core::session::SessionOptions;
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No per-user config directory on this platform
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("Config I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for [`AppConfig`]
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialisation failed
    #[error("Could not serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("Invalid {field}: {reason}")]
    Invalid {
        /// Offending key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial port settings
    pub serial: SerialConfig,
    /// Protocol engine settings
    pub protocol: ProtocolConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the default location, or defaults if it does not exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&super::config_file().ok_or(ConfigError::NoConfigDir)?)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&super::config_file().ok_or(ConfigError::NoConfigDir)?)
    }

    /// Load config from `path`, or defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_err)
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "serial.baud_rate",
                reason: "must be positive".to_string(),
            });
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(ConfigError::Invalid {
                field: "serial.data_bits",
                reason: format!("{} is not 5..=8", self.serial.data_bits),
            });
        }
        self.protocol.validate()
    }
}

/// Protocol engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Attempts per call, shared by all fault classes
    pub max_retries: u32,
    /// Stream read timeout
    pub read_timeout_ms: u64,
    /// Stream write timeout
    pub write_timeout_ms: u64,
    /// Pause before draining after a framing failure
    pub settle_delay_ms: u64,
    /// Bus behaviour after a header failure
    pub bus_retry_policy: BusRetryPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            read_timeout_ms: 100,
            write_timeout_ms: 100,
            settle_delay_ms: 100,
            bus_retry_policy: BusRetryPolicy::default(),
        }
    }
}

impl ProtocolConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "protocol.max_retries",
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "protocol.read_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "protocol.write_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Session tunables for the connection factory
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            max_retries: self.max_retries,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            bus_policy: self.bus_retry_policy,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Also write daily log files here
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::SerialParity;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 460_800);
        assert_eq!(config.protocol.max_retries, 3);
        assert_eq!(config.protocol.bus_retry_policy, BusRetryPolicy::ResendRequest);

        let options = config.protocol.session_options();
        assert_eq!(options.read_timeout, Duration::from_millis(100));
        assert_eq!(options.settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.serial.parity = SerialParity::Even;
        config.protocol.max_retries = 5;
        config.protocol.bus_retry_policy = BusRetryPolicy::RereadHeader;
        config.logging.directory = Some(dir.path().join("logs"));
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[protocol]\nmax_retries = 7\nbus_retry_policy = \"reread-header\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.protocol.max_retries, 7);
        assert_eq!(config.protocol.read_timeout_ms, 100);
        assert_eq!(config.protocol.bus_retry_policy, BusRetryPolicy::RereadHeader);
        assert_eq!(config.serial, SerialConfig::default());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[protocol]\nmax_retries = 0\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "protocol.max_retries",
                ..
            }
        ));
    }
}
