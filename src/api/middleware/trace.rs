use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use crate::core::logging::with_trace_id;
use std::time::Instant;
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// HTTP header name for trace ID
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Request logging stage
///
/// Generates a trace ID per request, runs the rest of the pipeline inside a
/// span carrying it, and emits exactly one completion line with method, path,
/// status and elapsed milliseconds. The trace ID is stored in the request
/// extensions and echoed in the `X-Trace-Id` response header.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    let mut request = request;
    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let response = with_trace_id(trace_id.clone(), async move {
        let response = next.run(request).await;
        let status = response.status().as_u16();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            status,
            duration_ms,
            "HTTP {} {} responded {} in {:.4} ms",
            method,
            path,
            status,
            duration_ms,
        );

        response
    }
    .instrument(span))
    .await;

    let (mut parts, body) = response.into_parts();
    parts.headers.insert(
        TRACE_ID_HEADER,
        HeaderValue::from_str(&trace_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
    );

    Response::from_parts(parts, body)
}

/// Extension type for storing trace ID in request extensions
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
