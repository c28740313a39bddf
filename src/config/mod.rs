//! Configuration management for resource-loader
//!
//! This module handles loading, parsing, and validating loader configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::retry::{ExponentialBackoff, NoRetry, RetryPolicy, WithDeadline};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Loader configuration
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Offline cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix RESOURCE_LOADER_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(base_url) = std::env::var("RESOURCE_LOADER_BASE_URL") {
            config.loader.base_url = base_url;
        }
        if let Ok(headless) = std::env::var("RESOURCE_LOADER_HEADLESS") {
            config.loader.headless = headless.parse().unwrap_or(true);
        }

        if let Ok(max_retries) = std::env::var("RESOURCE_LOADER_MAX_RETRIES") {
            config.retry.max_retries = max_retries
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid max_retries".to_string()))?;
        }
        if let Ok(interval) = std::env::var("RESOURCE_LOADER_BASE_INTERVAL_MS") {
            config.retry.base_interval_ms = interval
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid base_interval_ms".to_string()))?;
        }

        if let Ok(enabled) = std::env::var("RESOURCE_LOADER_CACHE_ENABLED") {
            config.cache.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(path) = std::env::var("RESOURCE_LOADER_CACHE_PATH") {
            config.cache.base_path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("RESOURCE_LOADER_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.loader.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue(
                "loader.max_concurrent must be greater than zero".to_string(),
            ));
        }
        if self.retry.deadline_ms == Some(0) {
            return Err(ConfigError::InvalidValue(
                "retry.deadline_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderConfig {
    /// Prefix prepended to every url sent to the transport
    #[serde(default)]
    pub base_url: String,

    /// Treat a neutral zero status as success (no host environment)
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum number of concurrent transport requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            headless: default_headless(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    6
}

/// Which retry policy to use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicyKind {
    /// Exponential backoff
    #[default]
    Exponential,
    /// Never retry
    None,
}

/// Retry configuration for transport attempts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Policy to use
    #[serde(default)]
    pub policy: RetryPolicyKind,

    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_base_interval")]
    pub base_interval_ms: u64,

    /// Overall deadline for a request in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicyKind::default(),
            max_retries: default_max_retries(),
            base_interval_ms: default_base_interval(),
            deadline_ms: None,
        }
    }
}

impl RetryConfig {
    /// Build the policy described by this configuration
    pub fn build_policy(&self) -> Arc<dyn RetryPolicy> {
        match (self.policy, self.deadline_ms) {
            (RetryPolicyKind::None, _) => Arc::new(NoRetry),
            (RetryPolicyKind::Exponential, None) => Arc::new(ExponentialBackoff::from(self)),
            (RetryPolicyKind::Exponential, Some(deadline)) => Arc::new(WithDeadline::new(
                ExponentialBackoff::from(self),
                Duration::from_millis(deadline),
            )),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_interval() -> u64 {
    500
}

/// Offline cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Whether the filesystem cache is used at all
    #[serde(default)]
    pub enabled: bool,

    /// Base path for cache storage
    #[serde(default = "default_cache_base_path")]
    pub base_path: PathBuf,

    /// Maximum cache size in megabytes
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Serve file and scene loads from the cache
    #[serde(default = "default_offline")]
    pub scene_offline: bool,

    /// Serve texture loads from the cache
    #[serde(default = "default_offline")]
    pub textures_offline: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_path: default_cache_base_path(),
            max_size_mb: default_max_size_mb(),
            scene_offline: default_offline(),
            textures_offline: default_offline(),
        }
    }
}

fn default_cache_base_path() -> PathBuf {
    PathBuf::from(".cache/resource-loader")
}

fn default_max_size_mb() -> u64 {
    512
}

fn default_offline() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
