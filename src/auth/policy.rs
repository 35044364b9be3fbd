//! Per-route access requirements
//!
//! Each endpoint declares what a caller needs. The declarations are collected
//! into an [`AccessTable`] once at startup so the authorization stage can look
//! them up by method and path before the request reaches the router.

use axum::http::Method;
use std::collections::HashMap;

/// Access requirement declared by an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RouteAccess {
    #[default]
    Anonymous,
    Authenticated,
    Role(String),
}

/// Route pattern → method → requirement
pub struct AccessTable {
    routes: matchit::Router<HashMap<Method, RouteAccess>>,
}

impl AccessTable {
    /// Build the table from `(method, path, access)` declarations.
    ///
    /// Paths use the router's `:param` syntax. Panics on conflicting
    /// patterns, like `Router::route`.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Method, &'a str, RouteAccess)>,
    {
        let mut grouped: HashMap<&'a str, HashMap<Method, RouteAccess>> = HashMap::new();
        for (method, path, access) in entries {
            grouped.entry(path).or_default().insert(method, access);
        }

        let mut routes = matchit::Router::new();
        for (path, methods) in grouped {
            routes
                .insert(path, methods)
                .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        }

        Self { routes }
    }

    /// Requirement for a request. Unknown routes are anonymous so they fall
    /// through to the router's 404.
    pub fn lookup(&self, method: &Method, path: &str) -> RouteAccess {
        let Ok(matched) = self.routes.at(path) else {
            return RouteAccess::Anonymous;
        };

        matched
            .value
            .get(method)
            .or_else(|| {
                // HEAD is served by the GET handler
                (method == Method::HEAD)
                    .then(|| matched.value.get(&Method::GET))
                    .flatten()
            })
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AccessTable {
        AccessTable::from_entries([
            (Method::GET, "/", RouteAccess::Anonymous),
            (Method::GET, "/secure", RouteAccess::Authenticated),
            (Method::GET, "/admin", RouteAccess::Role("admin".to_string())),
            (Method::GET, "/tasks/", RouteAccess::Anonymous),
            (Method::POST, "/tasks/", RouteAccess::Authenticated),
            (Method::DELETE, "/tasks/:id", RouteAccess::Role("admin".to_string())),
        ])
    }

    #[test]
    fn test_lookup_by_method_and_path() {
        let table = table();

        assert_eq!(table.lookup(&Method::GET, "/"), RouteAccess::Anonymous);
        assert_eq!(table.lookup(&Method::GET, "/secure"), RouteAccess::Authenticated);
        assert_eq!(
            table.lookup(&Method::GET, "/admin"),
            RouteAccess::Role("admin".to_string())
        );
        assert_eq!(table.lookup(&Method::GET, "/tasks/"), RouteAccess::Anonymous);
        assert_eq!(table.lookup(&Method::POST, "/tasks/"), RouteAccess::Authenticated);
    }

    #[test]
    fn test_lookup_with_params() {
        assert_eq!(
            table().lookup(&Method::DELETE, "/tasks/42"),
            RouteAccess::Role("admin".to_string())
        );
    }

    #[test]
    fn test_head_uses_get_requirement() {
        assert_eq!(table().lookup(&Method::HEAD, "/secure"), RouteAccess::Authenticated);
    }

    #[test]
    fn test_unknown_route_is_anonymous() {
        let table = table();
        assert_eq!(table.lookup(&Method::GET, "/nope"), RouteAccess::Anonymous);
        assert_eq!(table.lookup(&Method::PUT, "/secure"), RouteAccess::Anonymous);
    }
}
