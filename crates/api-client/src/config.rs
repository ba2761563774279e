//! Configuration for the CalTracker API client
//!
//! Two levels of configuration exist:
//! - [`ClientConfig`]: backend URL, keys, timeout, and the request defaults
//! - [`RequestOptions`]: per-call overrides resolved over those defaults into
//!   an immutable [`RequestConfig`]

use crate::error::{ApiError, ClientResult};
use caltracker_core::config::ConfigSchema;
use caltracker_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default production backend URL
const DEFAULT_API_URL: &str = "https://api.caltracker.app/rest/v1";

/// Local Supabase REST endpoint
const LOCAL_API_URL: &str = "http://localhost:54321/rest/v1";

/// Upper bound for exponential backoff delays built from the TOML settings
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(30);

/// Environment types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development (typically localhost Supabase)
    Development,
    /// Staging environment
    Staging,
    /// Production environment
    #[default]
    Production,
}

impl Environment {
    /// Parse from the `CALTRACKER_ENV` environment variable
    pub fn from_env() -> Self {
        Self::parse(&env::var("CALTRACKER_ENV").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "development" | "dev" | "local" => Self::Development,
            "staging" | "stage" => Self::Staging,
            _ => Self::Production,
        }
    }
}

/// Resolved per-call request configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Cache key for the response; no caching when absent
    pub cache_key: Option<String>,
    /// Lifetime of a cached response; `None` or zero never expires
    pub cache_ttl: Option<Duration>,
    /// Skip the offline cache read
    pub force_network: bool,
    /// Attempt bound and delay strategy
    pub retry: RetryConfig,
    /// Queue mutations issued while offline
    pub offline_queue: bool,
    /// Lifetime of a queued mutation; `None` never expires, zero skips queuing
    pub offline_ttl: Option<Duration>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            cache_key: None,
            cache_ttl: Some(Duration::from_secs(5 * 60)),
            force_network: false,
            retry: RetryConfig::fixed(3, Duration::from_millis(1000)),
            offline_queue: true,
            offline_ttl: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

/// Per-call overrides; unset fields fall back to the client defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    cache_key: Option<String>,
    cache_ttl: Option<Option<Duration>>,
    force_network: Option<bool>,
    retry_count: Option<u32>,
    retry_delay: Option<Duration>,
    offline_queue: Option<bool>,
    offline_ttl: Option<Option<Duration>>,
}

impl RequestOptions {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache the response under `key`
    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Expire the cached response after `ttl`
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(Some(ttl));
        self
    }

    /// Keep the cached response until it is overwritten or removed
    #[must_use]
    pub fn without_cache_expiry(mut self) -> Self {
        self.cache_ttl = Some(None);
        self
    }

    /// Ignore the cache while offline
    #[must_use]
    pub fn with_force_network(mut self, force: bool) -> Self {
        self.force_network = Some(force);
        self
    }

    /// Extra attempts after the first failure
    #[must_use]
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Base delay between attempts
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Enable or disable offline queuing
    #[must_use]
    pub fn with_offline_queue(mut self, enabled: bool) -> Self {
        self.offline_queue = Some(enabled);
        self
    }

    /// Drop the queued mutation if not replayed within `ttl`
    #[must_use]
    pub fn with_offline_ttl(mut self, ttl: Duration) -> Self {
        self.offline_ttl = Some(Some(ttl));
        self
    }

    /// Keep the queued mutation until it is replayed
    #[must_use]
    pub fn without_offline_expiry(mut self) -> Self {
        self.offline_ttl = Some(None);
        self
    }

    /// Merge over `defaults`
    #[must_use]
    pub fn resolve(&self, defaults: &RequestConfig) -> RequestConfig {
        let mut retry = defaults.retry.clone();
        if let Some(count) = self.retry_count {
            retry.retries = count;
        }
        if let Some(delay) = self.retry_delay {
            retry.delay = delay;
        }

        RequestConfig {
            cache_key: self.cache_key.clone().or_else(|| defaults.cache_key.clone()),
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            force_network: self.force_network.unwrap_or(defaults.force_network),
            retry,
            offline_queue: self.offline_queue.unwrap_or(defaults.offline_queue),
            offline_ttl: self.offline_ttl.unwrap_or(defaults.offline_ttl),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL that request paths are appended to
    pub base_url: String,
    /// Supabase anonymous key, sent as the `apikey` header
    pub anon_key: Option<String>,
    /// HTTP timeout for a single attempt
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Current environment
    pub environment: Environment,
    /// Defaults every request's options are resolved over
    pub request_defaults: RequestConfig,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            anon_key: None,
            timeout: Duration::from_secs(30),
            environment: Environment::default(),
            request_defaults: RequestConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables
    ///
    /// Reads the following environment variables:
    /// - `CALTRACKER_API_URL` or `API_URL`: Base URL for the backend
    /// - `SUPABASE_ANON_KEY`: Anonymous key for public endpoints
    /// - `CALTRACKER_ENV`: Environment (development/staging/production)
    /// - `CALTRACKER_TIMEOUT_SECS`: Request timeout in seconds
    pub fn from_env() -> ClientResult<Self> {
        let environment = Environment::from_env();
        let preset = Self::for_environment(environment);

        let base_url = env::var("CALTRACKER_API_URL")
            .or_else(|_| env::var("API_URL"))
            .unwrap_or(preset.base_url);

        let timeout = match env::var("CALTRACKER_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse().map(Duration::from_secs).map_err(|_| {
                ApiError::config(format!("CALTRACKER_TIMEOUT_SECS is not a number: {raw}"))
            })?,
            Err(_) => preset.timeout,
        };

        Ok(Self {
            base_url,
            anon_key: env::var("SUPABASE_ANON_KEY").ok().or(preset.anon_key),
            timeout,
            environment,
            request_defaults: preset.request_defaults,
        })
    }

    /// Build from the `[api]` and `[requests]` sections of `.caltracker.toml`
    pub fn from_schema(schema: &ConfigSchema) -> ClientResult<Self> {
        let requests = &schema.requests;
        let delay = Duration::from_millis(requests.retry_delay_ms);
        let retry = if requests.exponential_backoff {
            RetryConfig::exponential(requests.retry_count, delay, MAX_BACKOFF_DELAY)
        } else {
            RetryConfig::fixed(requests.retry_count, delay)
        };

        let config = Self {
            base_url: schema
                .api
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            anon_key: schema.api.anon_key.clone(),
            timeout: Duration::from_secs(schema.api.timeout_secs),
            environment: Environment::from_env(),
            request_defaults: RequestConfig {
                cache_key: None,
                cache_ttl: non_zero_millis(requests.cache_ttl_ms),
                force_network: false,
                retry,
                offline_queue: requests.offline_queue,
                offline_ttl: non_zero_millis(requests.offline_ttl_ms),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self::development(),
            Environment::Staging => Self::staging(),
            Environment::Production => Self::production(),
        }
    }

    /// Create development configuration (local Supabase, short retries)
    #[must_use]
    pub fn development() -> Self {
        Self {
            base_url: LOCAL_API_URL.to_string(),
            anon_key: None,
            timeout: Duration::from_secs(10),
            environment: Environment::Development,
            request_defaults: RequestConfig {
                retry: RetryConfig::fixed(1, Duration::from_millis(200)),
                ..RequestConfig::default()
            },
        }
    }

    /// Create staging configuration
    #[must_use]
    pub fn staging() -> Self {
        Self {
            base_url: env::var("STAGING_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            environment: Environment::Staging,
            ..Self::default()
        }
    }

    /// Create production configuration
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Builder-style method to set base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Builder-style method to set anon key
    #[must_use]
    pub fn with_anon_key(mut self, key: impl Into<String>) -> Self {
        self.anon_key = Some(key.into());
        self
    }

    /// Builder-style method to set timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder-style method to set the retry policy of every request
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.request_defaults.retry = retry;
        self
    }

    /// Builder-style method to replace the request defaults
    #[must_use]
    pub fn with_request_defaults(mut self, defaults: RequestConfig) -> Self {
        self.request_defaults = defaults;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ClientResult<()> {
        if self.base_url.is_empty() {
            return Err(ApiError::config("base_url cannot be empty"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ApiError::config("base_url must start with http:// or https://"));
        }

        url::Url::parse(&self.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.base_url)))?;

        if self.timeout.is_zero() {
            return Err(ApiError::config("timeout cannot be zero"));
        }

        Ok(())
    }
}

fn non_zero_millis(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}
