//! imgproxy-relay - a verifying, re-signing relay for imgproxy.
//!
//! This binary starts the HTTP server and wires all components together.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgproxy_relay::{
    config::Config,
    server::{create_router, AppState, Metrics},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    // Validation failures are reported here; the config itself never exits
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let metrics = match Metrics::new("imgproxy_relay") {
        Ok(metrics) => metrics,
        Err(e) => {
            error!("Failed to register metrics: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Backend base URL: {}", config.base_url);
    info!("  Signature size: {} bytes", config.signature_size);
    info!(
        "  Source URI encoding: {}",
        if config.encode { "base64" } else { "plain" }
    );
    info!("  Backend timeout: {}s", config.backend_timeout);
    if config.secret.is_some() {
        info!("  Backend bearer token: configured");
    }
    if config.metrics_enabled {
        info!("  Metrics: enabled at /metrics");
    }

    let addr = config.bind_address();
    let state = AppState::new(config, metrics);
    let router = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "imgproxy_relay=debug,tower_http=debug"
    } else {
        "imgproxy_relay=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
