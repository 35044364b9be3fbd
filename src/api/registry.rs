//! Endpoint registry
//!
//! Handler modules describe their endpoints as [`EndpointDescriptor`]s. The
//! registry mounts a fixed list of groups and turns them into both the route
//! table and the [`AccessTable`] the authorization stage consults, so a route
//! cannot exist without a declared access requirement.

use crate::api::handlers::{posts, system};
use crate::auth::{AccessTable, RouteAccess};
use axum::{
    handler::Handler,
    http::Method,
    routing::{self, MethodRouter},
    Router,
};
use tracing::debug;

/// One endpoint: where it lives, who may call it and what serves it
pub struct EndpointDescriptor {
    pub method: Method,
    pub path: &'static str,
    pub summary: &'static str,
    pub access: RouteAccess,
    handler: MethodRouter,
}

impl EndpointDescriptor {
    pub fn get<H, T>(path: &'static str, summary: &'static str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::GET, path, summary, routing::get(handler))
    }

    pub fn post<H, T>(path: &'static str, summary: &'static str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::POST, path, summary, routing::post(handler))
    }

    fn new(method: Method, path: &'static str, summary: &'static str, handler: MethodRouter) -> Self {
        Self {
            method,
            path,
            summary,
            access: RouteAccess::Anonymous,
            handler,
        }
    }

    /// Any authenticated caller
    pub fn require_authentication(mut self) -> Self {
        self.access = RouteAccess::Authenticated;
        self
    }

    /// Authenticated caller holding `role`
    pub fn require_role(mut self, role: &str) -> Self {
        self.access = RouteAccess::Role(role.to_string());
        self
    }
}

/// Endpoints sharing a path prefix and documentation tag
pub struct EndpointGroup {
    prefix: &'static str,
    tag: &'static str,
    private: bool,
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointGroup {
    /// Group whose endpoints keep their own access requirements
    pub fn public(prefix: &'static str, tag: &'static str) -> Self {
        Self {
            prefix,
            tag,
            private: false,
            endpoints: Vec::new(),
        }
    }

    /// Group whose endpoints require at least an authenticated caller
    pub fn private(prefix: &'static str, tag: &'static str) -> Self {
        Self {
            private: true,
            ..Self::public(prefix, tag)
        }
    }

    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = EndpointDescriptor>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }
}

/// Ordered list of endpoint groups
#[derive(Default)]
pub struct EndpointRegistry {
    groups: Vec<EndpointGroup>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every endpoint the service exposes
    pub fn standard() -> Self {
        Self::new()
            .group(EndpointGroup::public("", "System").endpoints(system::endpoints()))
            .group(EndpointGroup::public("/tasks", "Posts").endpoints(posts::endpoints()))
    }

    pub fn group(mut self, group: EndpointGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Build the route table and the matching access table
    pub fn build(self) -> (Router, AccessTable) {
        let mut router = Router::new();
        let mut access_entries: Vec<(Method, String, RouteAccess)> = Vec::new();

        for group in self.groups {
            for endpoint in group.endpoints {
                let access = match endpoint.access {
                    RouteAccess::Anonymous if group.private => RouteAccess::Authenticated,
                    access => access,
                };

                for path in route_paths(group.prefix, endpoint.path) {
                    debug!(
                        method = %endpoint.method,
                        path = %path,
                        tag = group.tag,
                        access = ?access,
                        summary = endpoint.summary,
                        "Endpoint registered"
                    );
                    router = router.route(&path, endpoint.handler.clone());
                    access_entries.push((endpoint.method.clone(), path, access.clone()));
                }
            }
        }

        let table = AccessTable::from_entries(
            access_entries
                .iter()
                .map(|(method, path, access)| (method.clone(), path.as_str(), access.clone())),
        );

        (router, table)
    }
}

/// Full paths for an endpoint. A trailing slash is optional: `/tasks/` is
/// also reachable as `/tasks`.
fn route_paths(prefix: &str, path: &str) -> Vec<String> {
    let joined = format!("{}{}", prefix.trim_end_matches('/'), path);
    let joined = if joined.is_empty() { "/".to_string() } else { joined };

    let mut paths = vec![joined.clone()];
    if joined.len() > 1 && joined.ends_with('/') {
        paths.push(joined.trim_end_matches('/').to_string());
    }
    paths
}
