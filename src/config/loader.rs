//! Configuration Loader
//!
//! Loads and validates configuration from TOML files. Every section is optional
//! and falls back to the detector defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::adapters::market_data::DATA_DIR_ENV;
use crate::detectors::params::validate_walk_forward;
use crate::detectors::{CalendarConfig, DetectionThresholds, ParamError, SeasonalConfig};
use crate::validation::WalkForwardConfig;

/// Main configuration structure matching cyclescope.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataSection,
    pub thresholds: DetectionThresholds,
    pub walk_forward: WalkForwardConfig,
    pub calendar: CalendarConfig,
    pub seasonal: SeasonalConfig,
    pub logging: LoggingSection,
}

/// Market data location and batch sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Directory of `<TICKER>.json` files (`~` expanded)
    pub data_dir: String,
    /// Concurrent (detector, ticker) jobs in a batch
    pub max_concurrency: usize,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            max_concurrency: 4,
        }
    }
}

impl DataSection {
    /// Get data directory with environment variable override
    /// Checks CYCLESCOPE_DATA_DIR env var first, falls back to config value
    pub fn get_data_dir(&self) -> String {
        match std::env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => dir,
            _ => self.data_dir.clone(),
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl From<ParamError> for ConfigError {
    fn from(err: ParamError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn with_thresholds(mut self, thresholds: DetectionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_walk_forward(mut self, walk_forward: WalkForwardConfig) -> Self {
        self.walk_forward = walk_forward;
        self
    }

    pub fn with_calendar(mut self, calendar: CalendarConfig) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_seasonal(mut self, seasonal: SeasonalConfig) -> Self {
        self.seasonal = seasonal;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.data.data_dir = data_dir.into();
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        validate_walk_forward(&self.walk_forward)?;
        self.calendar.validate()?;
        self.seasonal.validate()?;

        if self.data.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "data_dir must not be empty".to_string(),
            ));
        }

        if self.data.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(format!(
                "max_concurrency must be > 0, got {}",
                self.data.max_concurrency
            )));
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging level must be one of {:?}, got {}",
                LOG_LEVELS, self.logging.level
            )));
        }

        Ok(())
    }
}
