//! Offline-aware API client for the CalTracker backend
//!
//! This crate provides the request layer feature services use to talk to the
//! backend, and the coordinator that keeps their offline state in sync.
//!
//! # Features
//!
//! - **Response caching**: TTL cache served while offline
//! - **Bounded retry**: Fixed delay by default, exponential backoff optional
//! - **Offline queue**: Mutations issued offline are persisted and replayed
//! - **Sync coordinator**: Drains every service's queue on reconnect
//! - **Request correlation**: Every attempt carries an `X-Request-ID`
//!
//! # Example
//!
//! ```rust,no_run
//! use caltracker_api_client::{ClientConfig, Services};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let services = Services::builder(ClientConfig::from_env()?).build().await?;
//!     services.sync.start().await;
//!
//!     let foods = services.food.search_foods("egg").await;
//!     if let Some(foods) = foods.data() {
//!         println!("Found {} foods", foods.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod endpoints;
pub mod error;
pub mod queue;
pub mod result;
pub mod services;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::RequestLayer;
pub use config::{ClientConfig, Environment, RequestConfig, RequestOptions};
pub use error::{ApiError, ClientResult};
pub use result::ApiResult;
pub use services::Services;
pub use sync::{SyncCoordinator, SyncOutcome};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::client::RequestLayer;
    pub use crate::config::{ClientConfig, Environment, RequestConfig, RequestOptions};
    pub use crate::connectivity::{ConnectivityProbe, NetworkMonitor};
    pub use crate::endpoints::{FoodApi, NutritionApi};
    pub use crate::error::{ApiError, ClientResult};
    pub use crate::queue::DrainReport;
    pub use crate::result::ApiResult;
    pub use crate::services::Services;
    pub use crate::sync::{OfflineSync, SkipReason, SyncCoordinator, SyncOutcome, SyncReport};
    pub use crate::transport::{HttpMethod, HttpTransport, Transport};
}
