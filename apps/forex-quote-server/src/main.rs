//! Forex Quote Server Binary
//!
//! Starts the streaming FX quote server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin forex-quote-server
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `QUOTE_SERVER_GRPC_PORT`: gRPC server port (default: 50505)
//! - `QUOTE_SERVER_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8086)
//! - `QUOTE_SERVER_OUTBOUND_BUFFER`: Responses buffered per stream (default: 16)
//! - `QUOTE_PROVIDER_BASE_URL`: Price provider (default: <https://query1.finance.yahoo.com>)
//! - `QUOTE_PROVIDER_HTTP_TIMEOUT_MS`: Provider HTTP timeout (default: 4000)
//! - `QUOTE_LOOKUP_TIMEOUT_MS`: Bound on one lookup (default: 5000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: forex-quote-server)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use forex_quote_server::infrastructure::health::{HealthServer, HealthServerState};
use forex_quote_server::infrastructure::telemetry;
use forex_quote_server::{
    QuoteResolver, QuoteServer, QuoteServerConfig, YahooFxClient, bind_grpc, init_metrics,
    serve_grpc,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Forex Quote Server");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics()?;

    let config = QuoteServerConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Price source and resolver
    let source = YahooFxClient::new(&config.provider)?;
    let resolver = QuoteResolver::with_timeout(Arc::new(source), config.provider.lookup_timeout);

    let quote_server = Arc::new(QuoteServer::new(resolver, config.session.clone()));

    // Binding the gRPC port is fatal on failure
    let listener = bind_grpc(config.server.grpc_port).await?;

    if config.server.health_port != 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&quote_server),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    tracing::info!("Quote server ready");

    serve_grpc(quote_server, listener, await_shutdown(shutdown_token)).await?;

    tracing::info!("Quote server stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &QuoteServerConfig) {
    let lookup_timeout_ms =
        u64::try_from(config.provider.lookup_timeout.as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        grpc_port = config.server.grpc_port,
        health_port = config.server.health_port,
        outbound_buffer = config.session.outbound_buffer,
        lookup_timeout_ms,
        "Configuration loaded"
    );
    tracing::debug!(provider = %config.provider.base_url, "Price provider");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
}
