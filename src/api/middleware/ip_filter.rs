use crate::core::config::SecurityConfig;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Client addresses refused by the IP restriction stage
#[derive(Clone, Debug, Default)]
pub struct IpBlocklist {
    blocked: Arc<HashSet<IpAddr>>,
}

impl IpBlocklist {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            blocked: Arc::new(addrs.into_iter().collect()),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.blocked_addrs())
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    /// IPv4-mapped IPv6 peers are compared by their IPv4 address
    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        let addr = match addr {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(addr),
            v4 => v4,
        };
        self.blocked.contains(&addr)
    }
}

/// IP restriction stage
///
/// Rejects requests from blocked peers with `403 Access Denied.`. Requests
/// without a known peer address pass through.
pub async fn ip_filter_middleware(
    State(blocklist): State<IpBlocklist>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = peer.filter(|ip| blocklist.is_blocked(*ip)) {
        tracing::warn!(client_ip = %ip, "Request from blocked address refused");
        return (StatusCode::FORBIDDEN, "Access Denied.").into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use std::net::Ipv6Addr;
    use tower::util::ServiceExt; // For oneshot method

    fn app() -> Router {
        let blocklist = IpBlocklist::new(["10.0.0.66".parse::<IpAddr>().unwrap()]);
        Router::new()
            .route("/test", get(|| async { "OK" }))
            .layer(middleware::from_fn_with_state(blocklist, ip_filter_middleware))
    }

    fn request_from(addr: Option<[u8; 4]>) -> Request {
        let mut request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        if let Some(addr) = addr {
            request
                .extensions_mut()
                .insert(ConnectInfo(SocketAddr::from((addr, 50000))));
        }
        request
    }

    #[tokio::test]
    async fn test_blocked_address_denied() {
        let response = app().oneshot(request_from(Some([10, 0, 0, 66]))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Access Denied.");
    }

    #[tokio::test]
    async fn test_other_addresses_allowed() {
        let response = app().oneshot(request_from(Some([10, 0, 0, 1]))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app().oneshot(request_from(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_ipv4_mapped_peer_matches() {
        let blocklist = IpBlocklist::new(["10.0.0.66".parse::<IpAddr>().unwrap()]);
        let mapped = IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0x0a00, 0x0042));
        assert!(blocklist.is_blocked(mapped));
        assert!(!blocklist.is_blocked("10.0.0.67".parse().unwrap()));
    }
}
