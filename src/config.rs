//! Engine Configuration
//!
//! Features:
//! - Sensible defaults matching the on-disk limits of the log format
//! - Environment variable overrides (`WALKV_*`)
//! - Configuration validation
//! - Builder for programmatic setup

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MAX_KEY_LEN: usize = 256;
pub const DEFAULT_MAX_VALUE_LEN: usize = 1024 * 1024;
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["pretty", "compact"];

/// Storage engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the log and snapshot files
    pub data_dir: PathBuf,

    /// Log file name inside `data_dir`
    pub wal_file_name: String,

    /// Snapshot file name inside `data_dir`
    pub snapshot_file_name: String,

    /// Maximum key length in bytes
    pub max_key_len: usize,

    /// Maximum value length in bytes
    pub max_value_len: usize,

    /// Initial index capacity
    pub initial_capacity: usize,

    /// Run a checkpoint when the engine is closed
    pub checkpoint_on_close: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_file_name: "wal.log".to_string(),
            snapshot_file_name: "snapshot.bin".to_string(),
            max_key_len: DEFAULT_MAX_KEY_LEN,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            checkpoint_on_close: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `WALKV_*` overrides resolved through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(data_dir) = lookup("WALKV_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Some(len) = lookup("WALKV_MAX_KEY_LEN") {
            self.max_key_len = len
                .parse()
                .map_err(|_| Error::ConfigError("Invalid WALKV_MAX_KEY_LEN".to_string()))?;
        }
        if let Some(len) = lookup("WALKV_MAX_VALUE_LEN") {
            self.max_value_len = len
                .parse()
                .map_err(|_| Error::ConfigError("Invalid WALKV_MAX_VALUE_LEN".to_string()))?;
        }
        if let Some(flag) = lookup("WALKV_CHECKPOINT_ON_CLOSE") {
            self.checkpoint_on_close = flag.parse().map_err(|_| {
                Error::ConfigError("Invalid WALKV_CHECKPOINT_ON_CLOSE".to_string())
            })?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(level) = lookup("WALKV_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("WALKV_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.wal_file_name.is_empty() || self.snapshot_file_name.is_empty() {
            return Err(Error::ConfigError(
                "Log and snapshot file names must not be empty".to_string(),
            ));
        }
        if self.wal_file_name == self.snapshot_file_name {
            return Err(Error::ConfigError(format!(
                "Log and snapshot must use different files, both are {:?}",
                self.wal_file_name
            )));
        }

        // Lengths are stored as u32 on disk
        for (name, limit) in [
            ("max_key_len", self.max_key_len),
            ("max_value_len", self.max_value_len),
        ] {
            if limit == 0 || limit > u32::MAX as usize {
                return Err(Error::ConfigError(format!(
                    "{} must be between 1 and {}, got {}",
                    name,
                    u32::MAX,
                    limit
                )));
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::ConfigError(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(Error::ConfigError(format!(
                "Invalid log format: {}. Must be one of: {}",
                self.logging.format,
                VALID_LOG_FORMATS.join(", ")
            )));
        }

        Ok(())
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file_name)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file_name)
    }
}

/// Configuration builder for programmatic setup
pub struct ConfigBuilder {
    config: EngineConfig,
}

impl ConfigBuilder {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: EngineConfig::new(data_dir),
        }
    }

    pub fn with_max_key_len(mut self, len: usize) -> Self {
        self.config.max_key_len = len;
        self
    }

    pub fn with_max_value_len(mut self, len: usize) -> Self {
        self.config.max_value_len = len;
        self
    }

    pub fn with_checkpoint_on_close(mut self, enabled: bool) -> Self {
        self.config.checkpoint_on_close = enabled;
        self
    }

    pub fn with_snapshot_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.snapshot_file_name = name.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_key_len, 256);
        assert_eq!(config.max_value_len, 1024 * 1024);
        assert!(config.checkpoint_on_close);
        assert!(config.validate().is_ok());
        assert_eq!(config.wal_path(), PathBuf::from("./data/wal.log"));
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new("/tmp/walkv")
            .with_max_key_len(64)
            .with_checkpoint_on_close(false)
            .build()
            .unwrap();

        assert_eq!(config.max_key_len, 64);
        assert!(!config.checkpoint_on_close);
        assert_eq!(config.snapshot_path(), PathBuf::from("/tmp/walkv/snapshot.bin"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("WALKV_DATA_DIR", "/srv/kv"),
            ("WALKV_MAX_VALUE_LEN", "4096"),
            ("WALKV_CHECKPOINT_ON_CLOSE", "false"),
            ("LOG_LEVEL", "warn"),
            ("WALKV_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/kv"));
        assert_eq!(config.max_value_len, 4096);
        assert!(!config.checkpoint_on_close);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_override() {
        let mut config = EngineConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "WALKV_MAX_KEY_LEN").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_validation() {
        assert!(ConfigBuilder::new("d").with_max_key_len(0).build().is_err());
        assert!(ConfigBuilder::new("d").with_log_level("loud").build().is_err());
        assert!(ConfigBuilder::new("d")
            .with_snapshot_file_name("wal.log")
            .build()
            .is_err());
    }
}
