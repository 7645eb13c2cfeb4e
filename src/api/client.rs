//! Client configuration

use crate::core::AppConfig;

/// Configuration for the aws CLI client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Path to the aws executable
    ///
    /// Defaults to "aws" (assumes it's on PATH).
    pub aws_path: String,

    /// Region for every call, `None` leaves it to the environment
    pub region: Option<String>,

    /// Named profile for every call, `None` leaves it to the environment
    pub profile: Option<String>,

    /// Timeout for a single call in seconds
    pub timeout_secs: u64,

    /// How many recent executions a describe fetches
    pub execution_history: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            aws_path: "aws".to_string(),
            region: None,
            profile: None,
            timeout_secs: 10,
            execution_history: 10,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aws_path(mut self, aws_path: impl Into<String>) -> Self {
        self.aws_path = aws_path.into();
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Global arguments appended to every aws invocation
    pub fn global_args(&self) -> Vec<String> {
        let mut args = vec!["--output".to_string(), "json".to_string()];
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }
}

impl From<&AppConfig> for ClientConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            aws_path: config.aws_path.clone(),
            region: config.region.clone(),
            profile: config.profile.clone(),
            timeout_secs: config.call_timeout_secs,
            execution_history: config.execution_history,
        }
    }
}
