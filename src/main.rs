//! API Bootstrap - service entry point
//!
//! Loads configuration, starts logging, builds the server and serves until a
//! shutdown signal arrives.

use api_bootstrap::{api, core};

use anyhow::Result;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging system based on configuration
    let logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let status = match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Host terminated unexpectedly");
            ExitCode::FAILURE
        }
    };

    // Flush buffered log lines on every exit path
    logger.shutdown();

    status
}

async fn run(config: core::Config) -> Result<()> {
    info!("Starting API Bootstrap v{}", api_bootstrap::VERSION);
    info!(
        environment = %config.environment,
        host = %config.server.host,
        port = config.server.port,
        "Server configuration"
    );
    info!(
        enabled = config.rate_limit.enabled,
        permit_limit = config.rate_limit.permit_limit,
        window_secs = config.rate_limit.window_secs,
        queue_limit = config.rate_limit.queue_limit,
        "Rate limit configuration"
    );

    let server = api::ApiServer::new(&config)?;

    // Start serving (this will block until shutdown signal)
    server.serve().await?;

    info!("Server stopped");

    Ok(())
}
