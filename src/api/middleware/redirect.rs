use crate::core::config::SecurityConfig;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Settings for the HTTPS redirect stage
#[derive(Clone, Debug, Default)]
pub struct HttpsRedirect {
    pub enabled: bool,
    /// Port of the public HTTPS endpoint; omitted from the location when unset
    pub https_port: Option<u16>,
}

impl HttpsRedirect {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            enabled: config.https_redirect,
            https_port: config.https_port,
        }
    }

    /// Target for a request that arrived over plain HTTP, if it must move
    fn location(&self, request: &Request) -> Option<String> {
        if !self.enabled {
            return None;
        }

        // TLS terminates at the proxy; only its forwarded scheme is known here
        let scheme = request
            .headers()
            .get("X-Forwarded-Proto")
            .and_then(|value| value.to_str().ok())?;
        if !scheme.eq_ignore_ascii_case("http") {
            return None;
        }

        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())?;
        let host = match host.rsplit_once(':') {
            Some((name, _)) if !host.ends_with(']') => name,
            _ => host,
        };

        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Some(match self.https_port {
            Some(443) | None => format!("https://{}{}", host, path_and_query),
            Some(port) => format!("https://{}:{}{}", host, port, path_and_query),
        })
    }
}

/// HTTPS redirect stage
///
/// Answers plain-HTTP requests with `307 Temporary Redirect` to the HTTPS
/// location when enforcement is enabled.
pub async fn https_redirect_middleware(
    State(redirect): State<HttpsRedirect>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(location) = redirect.location(&request) {
        if let Ok(value) = HeaderValue::from_str(&location) {
            tracing::debug!(location = %location, "Redirecting to HTTPS");
            return (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, value)]).into_response();
        }
    }

    next.run(request).await
}
