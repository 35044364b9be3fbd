use crate::cache::ResponseCache;
use crate::core::config::CacheConfig;
use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared handle to the response store used by the caching stage
pub type SharedResponseCache = Arc<ResponseCache>;

pub fn response_cache(config: &CacheConfig) -> SharedResponseCache {
    Arc::new(ResponseCache::new(config.max_entries, config.max_body_size))
}

/// Response caching stage
///
/// Serves fresh stored responses for GET and HEAD requests and stores
/// successful responses that declare `Cache-Control: public, max-age=N`.
/// Requests carrying credentials or `Cache-Control: no-cache` bypass the
/// store entirely.
pub async fn response_cache_middleware(
    State(cache): State<SharedResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    if !is_cacheable_request(&request) {
        return next.run(request).await;
    }

    let key = cache_key(&request);

    if let Some(entry) = cache.get(&key).await {
        tracing::debug!(key = %key, "Serving response from cache");
        let age = entry.age(Instant::now());
        let mut response = (entry.status, entry.headers, entry.body).into_response();
        if let Ok(age) = HeaderValue::from_str(&age.to_string()) {
            response.headers_mut().insert(header::AGE, age);
        }
        return response;
    }

    let response = next.run(request).await;

    let Some(ttl) = shared_max_age(&response) else {
        return response;
    };

    // Only buffer bodies whose length is known to fit the store
    let limit = cache.max_body_size();
    let fits = HttpBody::size_hint(response.body())
        .upper()
        .is_some_and(|upper| upper <= limit as u64);
    if !fits {
        tracing::debug!(key = %key, limit, "Response too large to cache");
        return response;
    }

    let (parts, body) = response.into_parts();
    let body = match axum::body::to_bytes(body, limit).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to buffer response for caching");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(e) = cache
        .insert(key.clone(), parts.status, parts.headers.clone(), body.clone(), ttl)
        .await
    {
        tracing::debug!(key = %key, error = %e, "Response not cached");
    }

    Response::from_parts(parts, Body::from(body))
}

fn is_cacheable_request(request: &Request) -> bool {
    let method = request.method();
    if method != Method::GET && method != Method::HEAD {
        return false;
    }

    let headers = request.headers();
    if headers.contains_key(header::AUTHORIZATION) {
        return false;
    }

    !cache_control_directives(headers, header::CACHE_CONTROL)
        .iter()
        .any(|directive| directive == "no-cache" || directive == "no-store")
}

/// Responses vary by method, target and negotiated encoding
fn cache_key(request: &Request) -> String {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let encoding = request
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    format!("{} {} {}", request.method(), target, encoding)
}

/// Lifetime of a response that may be stored by a shared cache
fn shared_max_age(response: &Response) -> Option<Duration> {
    if response.status() != StatusCode::OK || response.headers().contains_key(header::SET_COOKIE) {
        return None;
    }

    let directives = cache_control_directives(response.headers(), header::CACHE_CONTROL);
    if !directives.iter().any(|d| d == "public")
        || directives.iter().any(|d| d == "private" || d == "no-store")
    {
        return None;
    }

    let max_age = |name: &str| {
        directives.iter().find_map(|d| {
            d.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
                .and_then(|secs| secs.trim_matches('"').parse::<u64>().ok())
        })
    };

    max_age("s-maxage")
        .or_else(|| max_age("max-age"))
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn cache_control_directives(headers: &HeaderMap, name: header::HeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|directive| directive.trim().to_ascii_lowercase())
        .filter(|directive| !directive.is_empty())
        .collect()
}
