//! Core utilities for the CalTracker client
//!
//! This crate provides the shared building blocks used by the API client:
//!
//! - **Error handling**: Errors with codes, context, and recovery suggestions
//! - **Retry policy**: Bounded retry with fixed or exponential backoff
//! - **Storage**: The async key-value boundary plus memory and file adapters
//! - **Clock**: Injectable wall clock for deterministic expiry tests
//! - **Configuration**: TOML-based configuration with serde defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use caltracker_core::storage::{KeyValueStore, MemoryStore};
//!
//! # async fn demo() -> caltracker_core::Result<()> {
//! let store = MemoryStore::new();
//! store.set("last_sync_timestamp", "1700000000000").await?;
//! assert!(store.exists("last_sync_timestamp").await?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod error;
pub mod retry;
pub mod storage;

pub use error::{Error, ErrorCode, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{Config, ConfigSchema};
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::retry::{retry, Backoff, RetryConfig};
    pub use crate::storage::{FileStore, KeyValueStore, MemoryStore};
}
