//! API Bootstrap Library
//!
//! A small web API foundation: configuration, logging, bearer token
//! authentication, fixed-window rate limiting and an explicit request
//! pipeline around a handful of endpoints.

pub mod api;
pub mod auth;
pub mod cache;
pub mod core;

// Re-export commonly used types
pub use api::ApiServer;
pub use crate::core::{ApiError, Config, Logger};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = anyhow::Result<T>;
