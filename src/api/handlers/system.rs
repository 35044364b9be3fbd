use crate::api::registry::EndpointDescriptor;
use crate::auth::Principal;
use tracing::debug;

pub fn endpoints() -> Vec<EndpointDescriptor> {
    vec![
        EndpointDescriptor::get("/", "Greeting", root),
        EndpointDescriptor::get("/health", "Liveness probe", health_check),
        EndpointDescriptor::get("/secure", "Authenticated access check", secure)
            .require_authentication(),
        EndpointDescriptor::get("/admin", "Administrator access check", admin).require_role("admin"),
    ]
}

/// Handler for GET / - Greeting
#[utoipa::path(
    get,
    path = "/",
    tag = "System",
    responses((status = 200, description = "Greeting", body = String, content_type = "text/plain"))
)]
pub async fn root() -> &'static str {
    "Hello, World!"
}

/// Handler for GET /health - Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    responses((status = 200, description = "Service is healthy", body = String, content_type = "text/plain"))
)]
pub async fn health_check() -> &'static str {
    "Healthy"
}

/// Handler for GET /secure - Any authenticated caller
#[utoipa::path(
    get,
    path = "/secure",
    tag = "System",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller is authenticated", body = String, content_type = "text/plain"),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub async fn secure(principal: Principal) -> &'static str {
    debug!(subject = %principal.subject, "Authenticated access");
    "You are authenticated!"
}

/// Handler for GET /admin - Callers holding the admin role
#[utoipa::path(
    get,
    path = "/admin",
    tag = "System",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller is an administrator", body = String, content_type = "text/plain"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller lacks the admin role")
    )
)]
pub async fn admin(principal: Principal) -> &'static str {
    debug!(subject = %principal.subject, "Administrator access");
    "Welcome Admin!"
}
