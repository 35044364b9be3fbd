//! REST API module
//!
//! This module provides the HTTP server and REST API endpoints including:
//! - Endpoint descriptors and the registry that mounts them
//! - The ordered request pipeline
//! - Pipeline stages (logging, security headers, caching, rate limiting, ...)
//! - OpenAPI documentation

pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod server;

pub use middleware::{RateLimiter, TraceId, TRACE_ID_HEADER};
pub use pipeline::{Pipeline, Stage};
pub use registry::{EndpointDescriptor, EndpointGroup, EndpointRegistry};
pub use server::ApiServer;
