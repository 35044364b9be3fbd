//! Structured logging system
//!
//! This module provides structured logging with:
//! - JSON and text format support
//! - Console output and a daily rolling log file, each on its own non-blocking writer
//! - An explicit lifecycle: [`Logger::init`] installs the subscriber, [`Logger::shutdown`] flushes
//! - The current request's trace ID, readable anywhere the request is being served

use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

tokio::task_local! {
    static TRACE_ID: String;
}

/// Run `future` with `trace_id` as the current trace ID
pub async fn with_trace_id<F: std::future::Future>(trace_id: String, future: F) -> F::Output {
    TRACE_ID.scope(trace_id, future).await
}

/// Trace ID of the request being served on this task, if any
pub fn current_trace_id() -> Option<String> {
    TRACE_ID.try_with(|id| id.clone()).ok()
}

/// Logger handle owning the background writer threads.
///
/// Buffered records are written out when the handle is shut down or dropped,
/// so the entry point keeps it alive until the very end of the process.
pub struct Logger {
    guards: Vec<WorkerGuard>,
}

impl Logger {
    /// Initialize the logging system based on configuration
    ///
    /// This sets up the global tracing subscriber with the configured format,
    /// level, and sinks.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

        let mut guards = Vec::new();
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if config.console {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            layers.push(format_layer(&config.format, writer)?);
            guards.push(guard);
        }

        if config.file_enabled {
            std::fs::create_dir_all(&config.directory)
                .context("Failed to create log directory")?;

            // Files are named <file_name>.<yyyy-mm-dd>
            let appender = tracing_appender::rolling::daily(&config.directory, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(format_layer(&config.format, writer)?);
            guards.push(guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(env_filter)
            .try_init()
            .context("Failed to initialize tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = %config.format,
            console = config.console,
            file = config.file_enabled,
            "Logging system initialized"
        );

        Ok(Logger { guards })
    }

    /// Flush buffered records and stop the writer threads
    pub fn shutdown(self) {
        tracing::info!("Flushing logs");
        drop(self.guards);
    }
}

fn format_layer(format: &str, writer: NonBlocking) -> Result<BoxedLayer> {
    let layer = match format {
        "json" => fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        "text" => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .boxed(),
        _ => anyhow::bail!("Invalid format configuration: {}", format),
    };
    Ok(layer)
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {}", level),
    }
}
