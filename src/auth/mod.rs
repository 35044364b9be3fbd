//! Authentication module
//!
//! This module provides:
//! - Bearer token validation against a shared secret or an issuer's published keys
//! - Claims and the authenticated principal
//! - Per-route access requirements
//! - Authentication and authorization pipeline stages

pub mod jwt;
pub mod jwks;
pub mod middleware;
pub mod models;
pub mod policy;

pub use jwt::{SharedSecret, SigningKeys, TokenValidator};
pub use jwks::JwksKeys;
pub use middleware::{authenticate, authorize, bearer_token};
pub use models::{Claims, Principal};
pub use policy::{AccessTable, RouteAccess};
