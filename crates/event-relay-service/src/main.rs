//! # Event-Relay Service
//!
//! Binary entry point for the event-relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes structured logging
//! - Builds the Direktiv forwarder and relay pipeline
//! - Starts the HTTP server from event-relay-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration error.

use anyhow::Context;
use event_relay_api::{load_configuration, start_server, LoggingConfig, ServiceError};
use event_relay_core::{DirektivForwarder, RelayPipeline};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging settings live in the configuration, so load it before
    // initializing tracing and report any load error afterwards.
    let loaded = load_configuration();
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    info!("Starting event-relay service");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    if config.downstream.token.is_empty() {
        warn!("DIREKTIV_TOKEN is empty; requests will carry an empty direktiv-token header");
    }

    info!(
        endpoint = %config.downstream.endpoint,
        namespace = %config.downstream.namespace,
        require_fields = config.extraction.require_fields,
        "Relaying events to Direktiv"
    );

    let forwarder = DirektivForwarder::new(config.forwarder_config())
        .context("failed to build the Direktiv forwarder")?;
    let pipeline = RelayPipeline::new(Arc::new(forwarder), config.extraction);

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(config, pipeline).await {
        error!("Failed to run server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
