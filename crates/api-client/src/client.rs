//! Offline-aware request layer
//!
//! A [`RequestLayer`] mediates every call a feature service makes to the
//! backend:
//! - Offline with a cache key: serve the cached response if still live
//! - Offline with queuing enabled: queue mutations, report `Offline`
//! - Otherwise: call the network with bounded retry, caching 2xx responses
//!
//! Every call resolves to an [`ApiResult`]; nothing is propagated.

use crate::cache::ResponseCache;
use crate::config::{ClientConfig, RequestConfig, RequestOptions};
use crate::connectivity::ConnectivityProbe;
use crate::error::{ApiError, ClientResult};
use crate::queue::{DrainReport, OfflineQueue, QueuedRequest};
use crate::result::ApiResult;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, Transport};
use caltracker_core::clock::{Clock, SystemClock};
use caltracker_core::retry::retry;
use caltracker_core::storage::KeyValueStore;
use caltracker_telemetry::{Timer, metrics, names};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Message used when a failed response carries no `message` field
const DEFAULT_FAILURE_MESSAGE: &str = "API request failed";

/// Request layer for one feature service
pub struct RequestLayer {
    service: String,
    base_url: String,
    defaults: RequestConfig,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn ConnectivityProbe>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cache: ResponseCache,
    queue: OfflineQueue,
}

impl RequestLayer {
    /// Create a layer whose queue is namespaced by `service`
    pub fn new(
        service: impl Into<String>,
        config: &ClientConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> ClientResult<Self> {
        let service = service.into();
        if service.trim().is_empty() {
            return Err(ApiError::config("service name cannot be empty"));
        }
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Self {
            cache: ResponseCache::new(store.clone(), clock.clone()),
            queue: OfflineQueue::new(service.clone(), store.clone(), clock.clone()),
            service,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            defaults: config.request_defaults.clone(),
            transport,
            connectivity,
            store,
            clock,
        })
    }

    /// Read expiry times from `clock` instead of the system time
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = ResponseCache::new(self.store.clone(), clock.clone());
        self.queue = OfflineQueue::new(self.service.clone(), self.store.clone(), clock.clone());
        self.clock = clock;
        self
    }

    /// Service name namespacing the offline queue
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// Defaults that per-call options are resolved over
    #[must_use]
    pub fn defaults(&self) -> &RequestConfig {
        &self.defaults
    }

    /// Response cache
    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Offline mutation queue
    #[must_use]
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Whether the connectivity probe reports a connection
    pub async fn is_connected(&self) -> bool {
        self.connectivity.is_connected().await
    }

    // -------------------------------------------------------------------------
    // Typed helpers
    // -------------------------------------------------------------------------

    /// GET and decode
    pub async fn get<T: DeserializeOwned>(&self, url: &str, options: &RequestOptions) -> ApiResult<T> {
        self.execute(url, HttpMethod::Get, None, options).await.decode()
    }

    /// POST a JSON body and decode
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
        options: &RequestOptions,
    ) -> ApiResult<T> {
        self.execute_serialized(url, HttpMethod::Post, body, options).await
    }

    /// PUT a JSON body and decode
    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
        options: &RequestOptions,
    ) -> ApiResult<T> {
        self.execute_serialized(url, HttpMethod::Put, body, options).await
    }

    /// DELETE; the response body is returned as raw JSON
    pub async fn delete(&self, url: &str, options: &RequestOptions) -> ApiResult<Value> {
        self.execute(url, HttpMethod::Delete, None, options).await
    }

    async fn execute_serialized<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        method: HttpMethod,
        body: &B,
        options: &RequestOptions,
    ) -> ApiResult<T> {
        match serde_json::to_value(body) {
            Ok(body) => self.execute(url, method, Some(body), options).await.decode(),
            Err(e) => ApiResult::Error(ApiError::Json(e)),
        }
    }

    // -------------------------------------------------------------------------
    // Core execution
    // -------------------------------------------------------------------------

    /// Execute a request with per-call overrides
    pub async fn execute(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<Value>,
        options: &RequestOptions,
    ) -> ApiResult<Value> {
        let config = options.resolve(&self.defaults);
        self.execute_with(url, method, body, &config).await
    }

    /// Execute a request with a fully resolved configuration
    #[instrument(skip(self, body, config), fields(service = %self.service))]
    pub async fn execute_with(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<Value>,
        config: &RequestConfig,
    ) -> ApiResult<Value> {
        metrics().increment(names::REQUESTS_TOTAL);

        if !self.connectivity.is_connected().await {
            if let Some(key) = config.cache_key.as_deref() {
                if config.force_network {
                    debug!(key = %key, "Skipping offline cache read");
                } else if let Some(data) = self.cache.read(key).await {
                    metrics().increment(names::CACHE_HIT);
                    debug!(key = %key, "Using cached data while offline");
                    return ApiResult::cached(data);
                } else {
                    metrics().increment(names::CACHE_MISS);
                }
            }

            if config.offline_queue {
                let queued = method.is_mutation() && self.enqueue(url, method, body, config).await;
                metrics().increment(names::REQUESTS_OFFLINE);
                return ApiResult::Offline(ApiError::offline(queued));
            }
        }

        self.send_with_retry(url, method, body.as_ref(), config).await
    }

    async fn enqueue(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<Value>,
        config: &RequestConfig,
    ) -> bool {
        if config.offline_ttl.is_some_and(|ttl| ttl.is_zero()) {
            debug!(url = %url, "Offline TTL is zero, not queueing");
            return false;
        }

        let request = QueuedRequest::new(
            url,
            method,
            body,
            self.clock.now_millis(),
            config.offline_ttl,
        );
        match self.queue.enqueue(request).await {
            Ok(_) => true,
            Err(e) => {
                warn!(service = %self.service, error = %e, "Cannot queue offline request");
                false
            }
        }
    }

    async fn send_with_retry(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<&Value>,
        config: &RequestConfig,
    ) -> ApiResult<Value> {
        let full_url = self.url_for(url);
        let target = full_url.as_str();
        let timer = Timer::start(names::REQUEST_DURATION_MS);

        let outcome = retry(&config.retry, move |attempt| {
            self.send_once(target, method, body, attempt)
        })
        .await;
        timer.stop();

        match outcome {
            Ok(success) => {
                if let Some(ref key) = config.cache_key {
                    self.cache.write(key, &success.value, config.cache_ttl).await;
                }
                metrics().increment(names::REQUESTS_SUCCESS);
                debug!(
                    url = %full_url,
                    attempts = success.attempts,
                    elapsed_ms = u64::try_from(success.total_duration.as_millis()).unwrap_or(u64::MAX),
                    "Request succeeded"
                );
                ApiResult::success(success.value)
            }
            Err(failure) => {
                metrics().increment(names::REQUESTS_ERROR);
                info!(
                    url = %full_url,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "Request failed"
                );
                ApiResult::Error(failure.last_error)
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<&Value>,
        attempt: u32,
    ) -> Result<Value, ApiError> {
        if attempt > 0 {
            metrics().increment(names::REQUESTS_RETRIES);
        }

        let request_id = Uuid::new_v4().to_string();
        debug!(
            request_id = %request_id,
            method = %method,
            url = %url,
            attempt = attempt + 1,
            "Sending request"
        );

        let request = HttpRequest {
            method,
            url: url.to_string(),
            body: body.filter(|_| method != HttpMethod::Get).cloned(),
            request_id,
        };
        let response = self.transport.send(request).await?;
        parse_response(response)
    }

    /// Absolute URL for a path; absolute URLs pass through
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Replay this service's offline queue once
    ///
    /// Entries are replayed with the service defaults, queuing disabled, and
    /// no cache key.
    pub async fn drain_offline_queue(&self) -> DrainReport {
        let replay_config = RequestConfig {
            cache_key: None,
            offline_queue: false,
            ..self.defaults.clone()
        };

        let config = &replay_config;
        self.queue
            .drain(move |entry| {
                async move {
                    self.execute_with(&entry.url, entry.method, entry.data, config)
                        .await
                        .is_success()
                }
            })
            .await
    }

    /// Remove expired cache entries
    pub async fn sweep_expired_cache(&self) -> usize {
        let removed = self.cache.sweep_expired().await;
        metrics().increment_by(names::CACHE_SWEPT, removed as u64);
        removed
    }
}

/// Turn a raw response into JSON or a failed attempt
///
/// An empty 2xx body is `null`. Non-2xx responses carry the body's `message`
/// field when present.
fn parse_response(response: HttpResponse) -> Result<Value, ApiError> {
    let parsed = if response.body.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str::<Value>(&response.body)
    };

    if response.is_success() {
        return parsed.map_err(ApiError::Json);
    }

    let message = parsed
        .ok()
        .as_ref()
        .and_then(|body| body.get("message"))
        .and_then(Value::as_str)
        .map_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string(), String::from);
    Err(ApiError::api_response(response.status, message))
}
