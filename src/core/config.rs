//! Application configuration from YAML
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration. Command-line flags override `region` and `profile`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name used for the config and cache directories
pub const APP_DIR: &str = "aws-codepipeline-cli";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path to the aws executable
    pub aws_path: String,

    /// Region passed to every aws call (ambient default when unset)
    pub region: Option<String>,

    /// Named profile passed to every aws call (ambient default when unset)
    pub profile: Option<String>,

    /// Timeout for a single API call, in seconds
    pub call_timeout_secs: u64,

    /// Maximum number of API calls in flight at once
    pub max_concurrent_calls: usize,

    /// Number of recent executions fetched per describe
    pub execution_history: usize,

    /// Refresh cadence
    pub refresh: RefreshConfig,

    /// Read-path retry policy
    pub retry: RetryConfig,

    /// Terminal settings
    pub ui: UiConfig,
}

/// Refresh cadence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Full pipeline list refresh interval
    pub list_interval_secs: u64,

    /// Describe interval for the pipeline on screen
    pub focused_interval_secs: u64,

    /// Describe interval for every other pipeline
    pub background_interval_secs: u64,

    /// Backoff after the first failed refresh of a pipeline
    pub failure_backoff_secs: u64,

    /// Upper bound for the per-pipeline failure backoff
    pub max_failure_backoff_secs: u64,
}

/// Retry policy configuration for read operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound for a single retry delay, in milliseconds
    pub max_delay_ms: u64,
}

/// Terminal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Render tick in milliseconds
    pub tick_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            aws_path: "aws".to_string(),
            region: None,
            profile: None,
            call_timeout_secs: 10,
            max_concurrent_calls: 4,
            execution_history: 10,
            refresh: RefreshConfig::default(),
            retry: RetryConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            list_interval_secs: 10,
            focused_interval_secs: 5,
            background_interval_secs: 30,
            failure_backoff_secs: 15,
            max_failure_backoff_secs: 120,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { tick_ms: 250 }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document, treat it as "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the explicit file, else the default location if it exists, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/aws-codepipeline-cli/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, region: Option<String>, profile: Option<String>) -> Self {
        if region.is_some() {
            self.region = region;
        }
        if profile.is_some() {
            self.profile = profile;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("call_timeout_secs", self.call_timeout_secs),
            ("max_concurrent_calls", self.max_concurrent_calls as u64),
            ("refresh.list_interval_secs", self.refresh.list_interval_secs),
            ("refresh.focused_interval_secs", self.refresh.focused_interval_secs),
            ("refresh.background_interval_secs", self.refresh.background_interval_secs),
            ("retry.max_attempts", u64::from(self.retry.max_attempts)),
            ("ui.tick_ms", self.ui.tick_ms),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", field)));
            }
        }

        if self.aws_path.trim().is_empty() {
            return Err(ConfigError::Invalid("aws_path must not be empty".to_string()));
        }

        if self.refresh.focused_interval_secs > self.refresh.background_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "refresh.focused_interval_secs ({}) must not exceed refresh.background_interval_secs ({})",
                self.refresh.focused_interval_secs, self.refresh.background_interval_secs
            )));
        }

        if self.refresh.failure_backoff_secs > self.refresh.max_failure_backoff_secs {
            return Err(ConfigError::Invalid(
                "refresh.failure_backoff_secs must not exceed refresh.max_failure_backoff_secs"
                    .to_string(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.ui.tick_ms)
    }
}
