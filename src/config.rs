//! YAML configuration for the notekeeper client.
//!
//! Every section is optional; missing sections and fields take their
//! defaults. Durations are whole milliseconds.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "laptop"
//!
//! logging:
//!   level: "info,resilience=debug"
//!   format: "pretty"        # or "json"
//!   with_target: false
//!
//! retry:
//!   max_attempts: 3
//!   initial_delay: 1000
//!   max_delay: 10000
//!   backoff_factor: 2.0
//!   jitter: false
//!
//! circuit_breaker:
//!   failure_threshold: 5
//!   reset_timeout: 30000
//!   half_open_max_attempts: 3
//!
//! events:
//!   buffer_size: 64
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use resilience::{CircuitBreakerConfig, RetryConfig, DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable naming the YAML file [`AppConfig::load`] reads.
pub const CONFIG_PATH_ENV: &str = "NOTEKEEPER_CONFIG";

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy shared by every remote data source
    #[serde(default)]
    pub retry: RetryConfig,

    /// Breaker settings; each data source gets its own breaker
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

impl AppConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `.env` if present, then the file named by
    /// [`CONFIG_PATH_ENV`]. Defaults when the variable is unset.
    pub fn load() -> Result<Self, ConfigLoadError> {
        // A missing .env file is normal.
        dotenvy::dotenv().ok();
        Self::load_from(std::env::var_os(CONFIG_PATH_ENV))
    }

    fn load_from(path: Option<OsString>) -> Result<Self, ConfigLoadError> {
        match path {
            Some(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.logging.validate()?;
        self.retry
            .validate()
            .map_err(|err| ConfigLoadError::Validation(format!("retry: {err}")))?;
        self.circuit_breaker
            .validate()
            .map_err(|err| ConfigLoadError::Validation(format!("circuit_breaker: {err}")))?;
        self.events.validate()?;

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            logging: LoggingConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines for a terminal
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration. `RUST_LOG`, when set, overrides `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"warn"` or `"info,resilience=debug"`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    #[serde(default)]
    pub with_target: bool,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        EnvFilter::try_new(&self.level).map_err(|err| {
            ConfigLoadError::Validation(format!(
                "logging.level '{}' is not a valid filter: {err}",
                self.level
            ))
        })?;
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            with_target: false,
        }
    }
}

/// Event bus sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per bus before a slow subscriber starts losing the
    /// oldest ones
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl EventsConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.buffer_size == 0 {
            return Err(ConfigLoadError::Validation(
                "events.buffer_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

// Helper functions for serde defaults
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}
fn default_buffer_size() -> usize {
    DEFAULT_CAPACITY
}
