//! Request pipeline composition
//!
//! The pipeline is an explicit, ordered list of stages. The first stage sees
//! the request first and the response last. Stages are folded over the route
//! table from the innermost outwards, so each one wraps everything listed
//! after it; the documentation routes are merged in at their own position and
//! therefore only pass through the stages listed before them.

use crate::api::docs::docs_router;
use crate::api::middleware::{
    https_redirect_middleware, ip_filter_middleware, rate_limit_middleware,
    request_logging_middleware, response_cache, response_cache_middleware,
    security_headers_middleware, HttpsRedirect, IpBlocklist, RateLimiter,
    SecurityHeadersConfig, SharedResponseCache,
};
use crate::auth::{authenticate, authorize, AccessTable, TokenValidator};
use crate::core::config::{Config, CorsConfig};
use crate::core::error::ApiError;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, Uri},
    middleware, Router,
};
use std::fmt;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};

/// A single pipeline stage and the state it needs
pub enum Stage {
    /// One log line per request plus the `X-Trace-Id` header
    RequestLogging,
    /// Fixed security headers and configured custom headers on every response
    SecurityHeaders(SecurityHeadersConfig),
    /// 403 for blocked client addresses
    IpFilter(IpBlocklist),
    /// Bearer token to principal; never rejects
    Authentication(TokenValidator),
    /// Per-route requirement: 401 anonymous, 403 missing role
    Authorization(Arc<AccessTable>),
    /// Swagger UI and OpenAPI document
    Docs(Router),
    Cors(CorsLayer),
    ResponseCache(SharedResponseCache),
    HttpsRedirect(HttpsRedirect),
    /// Route dispatch: 404 for unknown routes, 413 for oversized bodies
    Routing { max_body_size: usize },
    Compression,
    /// 429 with `Retry-After` once a client's permits and queue are exhausted
    RateLimit(RateLimiter),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::RequestLogging => "request-logging",
            Stage::SecurityHeaders(_) => "security-headers",
            Stage::IpFilter(_) => "ip-filter",
            Stage::Authentication(_) => "authentication",
            Stage::Authorization(_) => "authorization",
            Stage::Docs(_) => "docs",
            Stage::Cors(_) => "cors",
            Stage::ResponseCache(_) => "response-cache",
            Stage::HttpsRedirect(_) => "https-redirect",
            Stage::Routing { .. } => "routing",
            Stage::Compression => "compression",
            Stage::RateLimit(_) => "rate-limit",
        }
    }

    /// Wrap `router` (everything after this stage) with this stage
    fn wrap(self, router: Router) -> Router {
        match self {
            Stage::RequestLogging => router.layer(middleware::from_fn(request_logging_middleware)),
            Stage::SecurityHeaders(config) => {
                router.layer(middleware::from_fn_with_state(config, security_headers_middleware))
            }
            Stage::IpFilter(blocklist) => {
                router.layer(middleware::from_fn_with_state(blocklist, ip_filter_middleware))
            }
            Stage::Authentication(validator) => {
                router.layer(middleware::from_fn_with_state(validator, authenticate))
            }
            Stage::Authorization(table) => {
                router.layer(middleware::from_fn_with_state(table, authorize))
            }
            Stage::Docs(docs) => router.merge(docs),
            Stage::Cors(cors) => router.layer(cors),
            Stage::ResponseCache(cache) => {
                router.layer(middleware::from_fn_with_state(cache, response_cache_middleware))
            }
            Stage::HttpsRedirect(redirect) => {
                router.layer(middleware::from_fn_with_state(redirect, https_redirect_middleware))
            }
            Stage::Routing { max_body_size } => router
                .fallback(not_found)
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body_size)),
            Stage::Compression => router.layer(CompressionLayer::new()),
            Stage::RateLimit(limiter) => {
                router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            }
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered request pipeline, outermost stage first
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// The service's pipeline. Optional stages are left out when their
    /// configuration disables them.
    pub fn standard(
        config: &Config,
        validator: TokenValidator,
        access: Arc<AccessTable>,
        limiter: RateLimiter,
    ) -> Self {
        let mut stages = vec![
            Stage::RequestLogging,
            Stage::SecurityHeaders(SecurityHeadersConfig::from_config(&config.security)),
        ];

        let blocklist = IpBlocklist::from_config(&config.security);
        if !blocklist.is_empty() {
            stages.push(Stage::IpFilter(blocklist));
        }

        stages.push(Stage::Authentication(validator));
        stages.push(Stage::Authorization(access));

        if config.environment.is_development() {
            stages.push(Stage::Docs(docs_router()));
        }

        stages.push(Stage::Cors(cors_layer(config)));

        if config.cache.enabled {
            stages.push(Stage::ResponseCache(response_cache(&config.cache)));
        }
        if config.security.https_redirect {
            stages.push(Stage::HttpsRedirect(HttpsRedirect::from_config(&config.security)));
        }

        stages.push(Stage::Routing {
            max_body_size: config.server.max_request_body_size,
        });
        stages.push(Stage::Compression);

        if config.rate_limit.enabled {
            stages.push(Stage::RateLimit(limiter));
        }

        Self::new(stages)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Compose the stages around `routes`
    pub fn apply(self, routes: Router) -> Router {
        self.stages
            .into_iter()
            .rev()
            .fold(routes, |router, stage| stage.wrap(router))
    }
}

/// Permissive in development; the configured origins otherwise
pub fn cors_layer(config: &Config) -> CorsLayer {
    if config.environment.is_development() {
        return CorsLayer::permissive();
    }
    origin_restricted_cors(&config.cors)
}

fn origin_restricted_cors(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    if cors.allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(cors.allow_credentials)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::registry::EndpointRegistry;
    use crate::auth::jwt::tests::test_auth_config;
    use crate::core::AppEnvironment;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt; // For oneshot method

    fn test_config(environment: AppEnvironment) -> Config {
        let mut config = Config::defaults().unwrap();
        config.environment = environment;
        config.auth = test_auth_config();
        config
    }

    fn standard(config: &Config) -> Pipeline {
        let (_, table) = EndpointRegistry::standard().build();
        Pipeline::standard(
            config,
            TokenValidator::from_config(&config.auth).unwrap(),
            Arc::new(table),
            RateLimiter::from_config(&config.rate_limit),
        )
    }

    #[test]
    fn test_standard_stage_order() {
        let config = test_config(AppEnvironment::Development);
        assert_eq!(
            standard(&config).stage_names(),
            vec![
                "request-logging",
                "security-headers",
                "authentication",
                "authorization",
                "docs",
                "cors",
                "response-cache",
                "routing",
                "compression",
                "rate-limit",
            ]
        );
    }

    #[test]
    fn test_optional_stages_follow_configuration() {
        let mut config = test_config(AppEnvironment::Production);
        config.security.blocked_ips = vec!["10.0.0.66".to_string()];
        config.security.https_redirect = true;
        config.cache.enabled = false;
        config.rate_limit.enabled = false;

        assert_eq!(
            standard(&config).stage_names(),
            vec![
                "request-logging",
                "security-headers",
                "ip-filter",
                "authentication",
                "authorization",
                "cors",
                "https-redirect",
                "routing",
                "compression",
            ]
        );
    }

    #[tokio::test]
    async fn test_first_stage_is_outermost() {
        // A response produced by the innermost stage still passes through the
        // outer ones on its way out
        let config = test_config(AppEnvironment::Production);
        let pipeline = Pipeline::new(vec![
            Stage::RequestLogging,
            Stage::SecurityHeaders(SecurityHeadersConfig::default()),
            Stage::Routing { max_body_size: 16 },
            Stage::RateLimit(RateLimiter::from_config(&config.rate_limit)),
        ]);
        let app = pipeline.apply(Router::new());

        let request = Request::builder().uri("/missing").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("X-Trace-Id"));
        assert_eq!(response.headers().get("X-Frame-Options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn test_compression_follows_accept_encoding() {
        let pipeline = Pipeline::new(vec![
            Stage::Routing { max_body_size: 1024 },
            Stage::Compression,
        ]);
        let app = pipeline.apply(
            Router::new().route("/report", axum::routing::get(|| async { "report line\n".repeat(64) })),
        );

        let request = Request::builder()
            .uri("/report")
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");

        let request = Request::builder().uri("/report").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let pipeline = Pipeline::new(vec![Stage::Routing { max_body_size: 16 }]);
        let app = pipeline.apply(Router::new().route("/", axum::routing::post(|body: String| async move { body })));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_LENGTH, "32")
            .body(Body::from(vec![b'a'; 32]))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_restricted_outside_development() {
        let config = test_config(AppEnvironment::Production);
        let app = Pipeline::new(vec![Stage::Cors(cors_layer(&config))])
            .apply(Router::new().route("/", axum::routing::get(|| async { "OK" })));

        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://yourfrontend.com")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://yourfrontend.com"
        );
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );

        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://elsewhere.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_cors_permissive_in_development() {
        let config = test_config(AppEnvironment::Development);
        let app = Pipeline::new(vec![Stage::Cors(cors_layer(&config))])
            .apply(Router::new().route("/", axum::routing::get(|| async { "OK" })));

        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://elsewhere.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
