//! NL2SQL Orchestrator - Main entry point.
//!
//! Runs the conversational front end, either as an interactive session on
//! stdin/stdout or as a JSON HTTP service.

use nl2sql_orchestrator::AppError;
use nl2sql_orchestrator::auth::AuthConfig;
use nl2sql_orchestrator::config::{Config, TransportMode};
use nl2sql_orchestrator::orchestrator::Orchestrator;
use nl2sql_orchestrator::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so the stdio conversation stays readable.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    info!(
        transport = %config.transport,
        model = %config.llm_model,
        "Starting NL2SQL Orchestrator v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.llm_api_key.is_none() {
        warn!("No LLM API key configured; intent detection falls back to keywords and SQL generation is unavailable");
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    // Start the cleanup task for expired sessions
    orchestrator.clone().start_cleanup_task();

    // Run the appropriate transport
    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            let transport = StdioTransport::new(orchestrator);
            transport.run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                "Using HTTP transport"
            );
            let auth = AuthConfig::from_tokens(&config.auth_tokens).map_err(AppError::invalid_input)?;
            if auth.is_enabled() {
                info!(tokens = auth.token_count(), "Bearer token authentication enabled");
            } else {
                warn!("HTTP transport running without authentication; pass --auth-token to require one");
            }
            let transport = HttpTransport::new(orchestrator, &config.http_host, config.http_port)
                .with_auth(auth);
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Orchestrator error");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}
