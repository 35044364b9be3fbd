//! Authentication and authorization stages

use crate::auth::jwt::TokenValidator;
use crate::auth::models::Principal;
use crate::auth::policy::{AccessTable, RouteAccess};
use crate::core::error::{ApiError, Result};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Authentication stage
///
/// Validates the bearer token when one is present and stores the resulting
/// [`Principal`] in the request extensions. A missing or invalid token leaves
/// the request anonymous; rejecting it is the authorization stage's call.
pub async fn authenticate(
    State(validator): State<TokenValidator>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(request.headers()) {
        match validator.validate(&token).await {
            Ok(claims) => {
                let principal = claims.into_principal();
                debug!(subject = %principal.subject, roles = ?principal.roles, "Request authenticated");
                request.extensions_mut().insert(principal);
            }
            Err(ApiError::NetworkError(e)) => {
                warn!(error = %e, "Signing keys unavailable, continuing anonymously");
            }
            Err(e) => {
                debug!(error = %e, "Bearer token rejected, continuing anonymously");
            }
        }
    }

    next.run(request).await
}

/// Authorization stage
///
/// Enforces the requirement the matched endpoint declared: 401 for anonymous
/// callers, 403 for authenticated callers lacking the role.
pub async fn authorize(
    State(table): State<Arc<AccessTable>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let access = table.lookup(request.method(), request.uri().path());
    let principal = request.extensions().get::<Principal>();

    match (access, principal) {
        (RouteAccess::Anonymous, _) => {}
        (_, None) => {
            return Err(ApiError::AuthenticationError(
                "Authentication required".to_string(),
            ));
        }
        (RouteAccess::Authenticated, Some(_)) => {}
        (RouteAccess::Role(role), Some(principal)) => {
            if !principal.has_role(&role) {
                return Err(ApiError::PermissionDenied(format!("Role '{}' required", role)));
            }
        }
    }

    Ok(next.run(request).await)
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ApiError::AuthenticationError("User not authenticated".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::{mint_token, test_auth_config};
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::util::ServiceExt; // For oneshot method

    async fn whoami(principal: Option<Principal>) -> String {
        principal
            .map(|p| p.subject)
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn app() -> Router {
        let validator = TokenValidator::from_config(&test_auth_config()).unwrap();
        let table = Arc::new(AccessTable::from_entries([
            (Method::GET, "/public", RouteAccess::Anonymous),
            (Method::GET, "/secure", RouteAccess::Authenticated),
            (Method::GET, "/admin", RouteAccess::Role("admin".to_string())),
        ]));

        Router::new()
            .route("/public", get(whoami))
            .route("/secure", get(whoami))
            .route("/admin", get(whoami))
            // Layers run bottom-up: authentication first, then authorization
            .layer(middleware::from_fn_with_state(table, authorize))
            .layer(middleware::from_fn_with_state(validator, authenticate))
    }

    fn request(path: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_public_route_anonymous() {
        let response = app().oneshot(request("/public", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_public_route_sees_principal() {
        let token = mint_token("alice", &[]);
        let response = app().oneshot(request("/public", Some(&token))).await.unwrap();
        assert_eq!(body_text(response).await, "alice");
    }

    #[tokio::test]
    async fn test_invalid_token_on_public_route_is_anonymous() {
        let response = app()
            .oneshot(request("/public", Some("garbage")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_secure_route_requires_token() {
        let response = app().oneshot(request("/secure", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app()
            .oneshot(request("/secure", Some("garbage")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_secure_route_with_token() {
        let token = mint_token("alice", &[]);
        let response = app().oneshot(request("/secure", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_route_requires_role() {
        let token = mint_token("alice", &["reader"]);
        let response = app().oneshot(request("/admin", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let token = mint_token("root", &["admin"]);
        let response = app().oneshot(request("/admin", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "root");
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, "bearer xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, "Basic dGVzdDp0ZXN0".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
