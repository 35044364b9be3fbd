use crate::core::config::SecurityConfig;
use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'";

/// Security headers middleware
///
/// Adds to every response:
/// - X-Content-Type-Options: nosniff (prevents MIME type sniffing)
/// - X-Frame-Options: DENY (prevents clickjacking)
/// - Content-Security-Policy: default-src 'self' (restricts resource loading)
/// - any configured custom headers
pub async fn security_headers_middleware(
    State(config): State<SecurityHeadersConfig>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();

    parts.headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );

    parts.headers.insert(
        "X-Frame-Options",
        HeaderValue::from_static("DENY"),
    );

    parts.headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );

    for (name, value) in config.custom_headers.iter() {
        parts.headers.insert(name.clone(), value.clone());
    }

    Response::from_parts(parts, body)
}

/// Configuration for security headers
#[derive(Clone, Debug, Default)]
pub struct SecurityHeadersConfig {
    /// Extra headers appended to every response
    pub custom_headers: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl SecurityHeadersConfig {
    /// Build from configuration. Entries that are not valid header names or
    /// values are skipped; configuration validation reports them at startup.
    pub fn from_config(config: &SecurityConfig) -> Self {
        let custom_headers = config
            .custom_headers
            .iter()
            .filter_map(|(name, value)| {
                let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
                let value = HeaderValue::from_str(value).ok()?;
                Some((name, value))
            })
            .collect();

        Self {
            custom_headers: Arc::new(custom_headers),
        }
    }
}
