//! Network boundary
//!
//! The request layer talks to the backend through [`Transport`], one HTTP
//! exchange per call. [`HttpTransport`] is the `reqwest` implementation;
//! tests substitute scripted fakes.

use crate::config::ClientConfig;
use crate::error::{ApiError, ClientResult};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Request correlation ID header
pub const X_REQUEST_ID: &str = "X-Request-ID";

/// API key header for Supabase
const APIKEY_HEADER: &str = "apikey";

/// HTTP methods the request layer issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Read
    Get,
    /// Create
    Post,
    /// Replace
    Put,
    /// Remove
    Delete,
}

impl HttpMethod {
    /// Whether the method changes server state (and may be queued offline)
    #[must_use]
    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::Get)
    }

    /// Upper-case method name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// One outbound HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    /// JSON body; never sent with GET
    pub body: Option<Value>,
    /// Correlation ID sent as `X-Request-ID`
    pub request_id: String,
}

/// Raw response: status and body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs HTTP exchanges.
///
/// An `Err` means no response was received; non-2xx responses are `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// `reqwest`-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    inner: Client,
}

impl HttpTransport {
    /// Build a client with JSON headers, the configured timeout, and the
    /// `apikey` header when an anon key is configured
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("caltracker-api-client/", env!("CARGO_PKG_VERSION"))),
        );

        if let Some(ref key) = config.anon_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| ApiError::config("anon_key contains invalid header characters"))?;
            default_headers.insert(APIKEY_HEADER, value);
        }

        let inner = Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .build()
            .map_err(ApiError::Request)?;

        Ok(Self { inner })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self
            .inner
            .request(request.method.into(), &request.url)
            .header(X_REQUEST_ID, &request.request_id);

        if request.method != HttpMethod::Get {
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(
            request_id = %request.request_id,
            status = status,
            bytes = body.len(),
            "Response received"
        );

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_classification() {
        assert!(!HttpMethod::Get.is_mutation());
        assert!(HttpMethod::Post.is_mutation());
        assert!(HttpMethod::Put.is_mutation());
        assert!(HttpMethod::Delete.is_mutation());
    }

    #[test]
    fn test_method_serde_uppercase() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
        let parsed: HttpMethod = serde_json::from_str("\"PUT\"").unwrap();
        assert_eq!(parsed, HttpMethod::Put);
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(304, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }

    #[test]
    fn test_transport_creation() {
        let config = ClientConfig::development().with_anon_key("public-anon-key");
        assert!(HttpTransport::new(&config).is_ok());

        let bad = ClientConfig::development().with_anon_key("line\nbreak");
        assert!(HttpTransport::new(&bad).is_err());
    }
}
