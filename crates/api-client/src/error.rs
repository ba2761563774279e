//! Error types for the API client

use thiserror::Error;

/// Result type alias for client construction and configuration
pub type ClientResult<T> = Result<T, ApiError>;

/// Message attached to an offline mutation that was queued
pub const OFFLINE_QUEUED_MESSAGE: &str =
    "No network connection available. Request queued for later.";

/// Message attached to an offline request that was not queued
pub const OFFLINE_MESSAGE: &str = "No network connection available.";

/// API client errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// API returned an error response
    #[error("API error ({status}): {message}")]
    ApiResponse {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },

    /// No connectivity
    #[error("{0}")]
    Offline(String),

    /// Underlying transport failed without an HTTP response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Key-value store failure
    #[error("Storage error: {0}")]
    Storage(#[from] caltracker_core::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an API response error
    pub fn api_response(status: u16, message: impl Into<String>) -> Self {
        Self::ApiResponse {
            status,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Offline error, worded by whether the request was queued
    #[must_use]
    pub fn offline(queued: bool) -> Self {
        if queued {
            Self::Offline(OFFLINE_QUEUED_MESSAGE.to_string())
        } else {
            Self::Offline(OFFLINE_MESSAGE.to_string())
        }
    }

    /// Check if this is an offline error
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiResponse { status, .. } if (400..500).contains(status))
    }

    /// Check if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiResponse { status, .. } if *status >= 500)
    }

    /// HTTP status, when the error came from a response
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiResponse { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
