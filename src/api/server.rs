//! HTTP Server implementation
//!
//! This module provides the HTTP server using Axum framework with:
//! - Configurable host/port binding
//! - The request pipeline built from configuration
//! - Peer addresses for rate-limit partitioning
//! - Graceful shutdown handling

use crate::api::pipeline::Pipeline;
use crate::api::registry::EndpointRegistry;
use crate::api::middleware::RateLimiter;
use crate::auth::TokenValidator;
use crate::core::config::ServerConfig;
use crate::core::Config;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// HTTP API Server
pub struct ApiServer {
    router: Router,
    config: ServerConfig,
    replenisher: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Create a new API server with the given configuration
    ///
    /// Must be called inside a Tokio runtime: the rate limiter's replenisher
    /// task is started here.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let validator = TokenValidator::from_config(&config.auth)?;
        info!(
            authority = %config.auth.authority,
            audiences = ?config.auth.accepted_audiences(),
            shared_secret = config.auth.signing_secret.is_some(),
            "Token validation configured"
        );

        let limiter = RateLimiter::from_config(&config.rate_limit);
        let replenisher = config
            .rate_limit
            .enabled
            .then(|| limiter.spawn_replenisher());

        let (routes, access) = EndpointRegistry::standard().build();
        let pipeline = Pipeline::standard(config, validator, Arc::new(access), limiter);
        info!(
            environment = %config.environment,
            stages = ?pipeline.stage_names(),
            "Request pipeline assembled"
        );

        Ok(Self {
            router: pipeline.apply(routes),
            config: config.server.clone(),
            replenisher,
        })
    }

    /// Start the HTTP server and listen for requests
    ///
    /// This method will block until the server is shut down gracefully.
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket_addr: SocketAddr = addr.parse()?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            max_request_body_size = self.config.max_request_body_size,
            "Starting HTTP server"
        );

        let listener = tokio::net::TcpListener::bind(socket_addr).await?;

        info!(addr = %listener.local_addr()?, "HTTP server listening");

        Self::serve_on(listener, self.router, shutdown_signal()).await?;

        if let Some(replenisher) = self.replenisher {
            replenisher.abort();
        }

        info!("HTTP server shut down gracefully");

        Ok(())
    }

    /// Serve `router` on an already bound listener until `shutdown` resolves
    pub async fn serve_on<F>(
        listener: tokio::net::TcpListener,
        router: Router,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        Ok(())
    }

    /// Take the router, for serving it elsewhere or driving it in tests
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Initiating graceful shutdown...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::test_auth_config;

    fn test_config() -> Config {
        let mut config = Config::defaults().unwrap();
        config.auth = test_auth_config();
        config
    }

    #[tokio::test]
    async fn test_api_server_creation() {
        let server = ApiServer::new(&test_config()).unwrap();
        assert!(server.replenisher.is_some());
    }

    #[tokio::test]
    async fn test_serves_over_tcp_until_shutdown() {
        let server = ApiServer::new(&test_config()).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(ApiServer::serve_on(
            listener,
            server.into_router(),
            async move {
                let _ = stop_rx.await;
            },
        ));

        let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "Healthy");

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
