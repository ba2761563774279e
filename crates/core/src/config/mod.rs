//! Configuration loading and schema definitions
//!
//! Client configuration read from `.caltracker.toml`.

mod loader;
mod schema;

pub use loader::Config;
pub use schema::*;
