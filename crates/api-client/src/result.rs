//! Outcome of a request-layer call
//!
//! Every request resolves to exactly one [`ApiResult`] variant. Failures are
//! values here, never panics or propagated errors, so feature code can render
//! a cached value, an offline banner, or an error message from one match.

use crate::error::ApiError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Tri-state request outcome
#[derive(Debug)]
pub enum ApiResult<T> {
    /// Data from the network or, when offline, from the cache
    Success {
        /// Response payload
        data: T,
        /// Whether the payload was served from the local cache
        from_cache: bool,
    },
    /// The request ran and failed
    Error(ApiError),
    /// No connectivity; the request did not reach the network
    Offline(ApiError),
}

impl<T> ApiResult<T> {
    /// Fresh network data
    pub fn success(data: T) -> Self {
        Self::Success {
            data,
            from_cache: false,
        }
    }

    /// Data served from the cache
    pub fn cached(data: T) -> Self {
        Self::Success {
            data,
            from_cache: true,
        }
    }

    /// Check for the success variant
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Check for the offline variant
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }

    /// Check for the error variant
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Whether the data came from the cache (false for non-success variants)
    #[must_use]
    pub fn from_cache(&self) -> bool {
        matches!(self, Self::Success { from_cache: true, .. })
    }

    /// Borrow the payload, if any
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Take the payload, if any
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Borrow the error of the error or offline variant
    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Success { .. } => None,
            Self::Error(e) | Self::Offline(e) => Some(e),
        }
    }

    /// Transform the payload, keeping the cache flag
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        match self {
            Self::Success { data, from_cache } => ApiResult::Success {
                data: f(data),
                from_cache,
            },
            Self::Error(e) => ApiResult::Error(e),
            Self::Offline(e) => ApiResult::Offline(e),
        }
    }

    /// Convert into a plain `Result`, folding offline into the error side
    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            Self::Success { data, .. } => Ok(data),
            Self::Error(e) | Self::Offline(e) => Err(e),
        }
    }
}

impl ApiResult<Value> {
    /// Deserialize a JSON payload into a typed one
    ///
    /// A payload that does not match `T` becomes the error variant.
    pub fn decode<T: DeserializeOwned>(self) -> ApiResult<T> {
        match self {
            Self::Success { data, from_cache } => match serde_json::from_value(data) {
                Ok(data) => ApiResult::Success { data, from_cache },
                Err(e) => ApiResult::Error(ApiError::Json(e)),
            },
            Self::Error(e) => ApiResult::Error(e),
            Self::Offline(e) => ApiResult::Offline(e),
        }
    }
}
