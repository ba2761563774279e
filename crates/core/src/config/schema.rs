//! Configuration schema definitions
//!
//! Every field has a serde default, so a partial file (or none at all) is valid.

use serde::{Deserialize, Serialize};

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfigSchema {
    /// Backend connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Process-wide request defaults
    #[serde(default)]
    pub requests: RequestDefaultsConfig,

    /// Sync coordinator settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Base URL that request paths are appended to
    #[serde(default)]
    pub base_url: Option<String>,

    /// Public (anon) key sent as the `apikey` header
    #[serde(default)]
    pub anon_key: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            anon_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Defaults merged under every request's own options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestDefaultsConfig {
    /// Cache lifetime in milliseconds (0 = never expires)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Extra attempts after the first failure
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Use exponential backoff instead of a fixed delay
    #[serde(default)]
    pub exponential_backoff: bool,

    /// Queue mutations issued while offline
    #[serde(default = "default_true")]
    pub offline_queue: bool,

    /// Lifetime of queued mutations in milliseconds (0 = never expires)
    #[serde(default = "default_offline_ttl_ms")]
    pub offline_ttl_ms: u64,
}

impl Default for RequestDefaultsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: false,
            offline_queue: true,
            offline_ttl_ms: default_offline_ttl_ms(),
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_offline_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_true() -> bool {
    true
}

/// Sync coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Sweep expired cache entries when the coordinator starts
    #[serde(default = "default_true")]
    pub sweep_on_start: bool,

    /// Drain queues when connectivity is restored
    #[serde(default = "default_true")]
    pub sync_on_reconnect: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sweep_on_start: true,
            sync_on_reconnect: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
