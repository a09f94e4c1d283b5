//! Configuration management for the batch coordinator

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::normalizer;

/// Main configuration structure for the batch coordinator
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Transport endpoints
    pub endpoint: EndpointConfig,

    /// Batch accumulation settings
    pub batching: BatchingConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Batch retry settings
    pub retry: RetryConfig,

    /// Per-request lifecycle settings
    pub requests: RequestConfig,

    /// Cache key normalization settings
    pub normalizer: NormalizerConfig,
}

/// Transport endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// URL of the batch endpoint accepting `{"requests": [...]}`
    pub batch_url: String,

    /// Base URL for the single-request fallback path
    pub base_url: String,

    /// Static headers attached to every outbound call
    pub headers: HashMap<String, String>,
}

/// Batch accumulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Maximum number of requests dispatched in one batch
    pub max_batch_size: usize,

    /// Flush window opened by the first enqueue, in milliseconds
    pub batch_delay_ms: u64,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching of successful GET responses
    pub enabled: bool,

    /// Default entry TTL in milliseconds
    pub default_ttl_ms: u64,

    /// Maximum number of cached entries
    pub max_entries: usize,

    /// Background sweep interval in milliseconds
    pub sweep_interval_ms: u64,
}

/// Batch retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable whole-batch retry on transport failure
    pub enabled: bool,

    /// Maximum retry attempts after the initial dispatch
    pub max_retries: u32,

    /// Base delay between attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Delay growth mode across attempts
    pub backoff: BackoffMode,
}

/// Delay growth mode between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    /// Same delay for every attempt
    Fixed,

    /// Delay multiplied by the attempt number
    Incrementing,
}

/// Per-request lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Default per-request timeout in milliseconds
    pub default_timeout_ms: u64,

    /// Age after which an unsettled promise is rejected, in milliseconds
    pub stale_after_ms: u64,

    /// Interval of the registry staleness sweep in milliseconds
    pub registry_sweep_interval_ms: u64,
}

/// Cache key normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Parameter names excluded from cache keys (cache busters, nonces)
    pub ignored_params: Vec<String>,

    /// Endpoints keyed by bare path regardless of parameters
    pub immutable_endpoints: Vec<String>,

    /// Minimum TTL applied to immutable endpoints, in milliseconds
    pub immutable_min_ttl_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            batch_url: "http://localhost:8080/api/batch".to_string(),
            base_url: "http://localhost:8080".to_string(),
            headers: HashMap::new(),
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 25,
            batch_delay_ms: 50,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_ms: 60_000,
            max_entries: 1024,
            sweep_interval_ms: 30_000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            retry_delay_ms: 250,
            backoff: BackoffMode::Incrementing,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            stale_after_ms: 300_000,
            registry_sweep_interval_ms: 60_000,
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            ignored_params: normalizer::default_ignored_params(),
            immutable_endpoints: Vec::new(),
            immutable_min_ttl_ms: 300_000,
        }
    }
}

impl BatchingConfig {
    /// Flush window duration
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl CacheConfig {
    /// Default entry TTL
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Background sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl RetryConfig {
    /// Base delay between attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl RequestConfig {
    /// Default per-request timeout
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Staleness threshold for unsettled promises
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    /// Registry staleness sweep interval
    pub fn registry_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.registry_sweep_interval_ms)
    }
}

impl NormalizerConfig {
    /// Minimum TTL applied to immutable endpoints
    pub fn immutable_min_ttl(&self) -> Duration {
        Duration::from_millis(self.immutable_min_ttl_ms)
    }
}

impl CoordinatorConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config/reqmux")
    }

    /// Load configuration from a specific file and environment
    pub fn load_from(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            // Add environment-specific config
            .add_source(
                File::with_name(&format!(
                    "{}-{}",
                    path,
                    std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
                ))
                .required(false),
            )
            // Add environment variables with REQMUX_ prefix
            .add_source(Environment::with_prefix("REQMUX").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if Url::parse(&self.endpoint.batch_url).is_err() {
            return Err(ConfigError::Message(format!(
                "Invalid batch URL: {}",
                self.endpoint.batch_url
            )));
        }

        if Url::parse(&self.endpoint.base_url).is_err() {
            return Err(ConfigError::Message(format!(
                "Invalid base URL: {}",
                self.endpoint.base_url
            )));
        }

        if self.batching.max_batch_size == 0 {
            return Err(ConfigError::Message(
                "max_batch_size must be greater than 0".into(),
            ));
        }

        if self.requests.default_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "default_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Message(
                "max_entries must be greater than 0 when caching is enabled".into(),
            ));
        }

        if self.retry.enabled && self.retry.retry_delay_ms == 0 {
            return Err(ConfigError::Message(
                "retry_delay_ms must be greater than 0 when retry is enabled".into(),
            ));
        }

        Ok(())
    }
}
