//! # Event-Relay HTTP Service
//!
//! HTTP server receiving binary-mode CloudEvents and relaying them to
//! Direktiv through the [`RelayPipeline`].
//!
//! This service provides:
//! - The relay endpoint at `/` (any method)
//! - A health check endpoint
//! - Request logging with correlation IDs
//!
//! Per-request failures are answered with an error status and never stop
//! the server.

pub mod config;
pub mod errors;

pub use config::{
    load_configuration, DownstreamConfig, LoggingConfig, ServerConfig, ServiceConfig,
};
pub use errors::{ConfigError, RelayHandlerError, ServiceError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

use axum::{
    body::Body,
    extract::State,
    http::HeaderMap,
    middleware,
    response::{Json, Response},
    routing::{any, get},
    Router,
};
use event_relay_core::{
    CloudEventHeaders, CorrelationId, ExtractionError, RelayError, RelayPipeline, RelayRequest,
};
use http_body_util::LengthLimitError;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, future::IntoFuture, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Header used to correlate a request across log lines and responses
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
///
/// Read-only after start-up; cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Relay pipeline shared by all requests
    pub pipeline: Arc<RelayPipeline>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServiceConfig, pipeline: RelayPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(handle_event))
        .route("/health", get(handle_health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
///
/// Serves until SIGINT or SIGTERM, then stops accepting connections and
/// lets in-flight requests finish.
pub async fn start_server(
    config: ServiceConfig,
    pipeline: RelayPipeline,
) -> Result<(), ServiceError> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let app = create_router(AppState::new(config, pipeline));

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.changed().await;
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => {
            return result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            });
        }
        _ = shutdown_signal() => {
            info!(
                "Initiating graceful shutdown with {}s timeout",
                shutdown_timeout.as_secs()
            );
            let _ = shutdown_tx.send(true);
        }
    }

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(result) => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?,
        Err(_) => warn!(
            "In-flight requests did not finish within {}s; shutting down anyway",
            shutdown_timeout.as_secs()
        ),
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Relay Handler
// ============================================================================

/// Relay one inbound CloudEvent to Direktiv
///
/// 1. Reject bodies larger than `server.max_body_size`
/// 2. Read the body and the `ce-*` headers
/// 3. Run the relay pipeline, bounded by `server.timeout_seconds`
///
/// The downstream call lives inside this handler's future: if the sender
/// disconnects, axum drops the future and the downstream call with it.
#[instrument(skip(state, headers, body))]
pub async fn handle_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<RelayResponse>, RelayHandlerError> {
    let max_body_size = state.config.server.max_body_size;

    if let Some(size) = content_length(&headers) {
        if size > max_body_size {
            return Err(RelayHandlerError::PayloadTooLarge {
                size,
                max_size: max_body_size,
            });
        }
    }

    let body = axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|e| {
            // Bodies without a usable content-length are only caught while reading
            if is_length_limit_error(&e) {
                return RelayHandlerError::BodyLimitExceeded {
                    max_size: max_body_size,
                };
            }

            let error = RelayError::from(ExtractionError::BodyRead {
                message: e.to_string(),
            });
            error!(error = %error, stage = error.stage(), "Relay failed");
            RelayHandlerError::from(error)
        })?;

    let header_map = headers_to_map(&headers);
    let request = RelayRequest::new(CloudEventHeaders::from_http_headers(&header_map), body);

    let timeout_seconds = state.config.server.timeout_seconds;
    let outcome = tokio::time::timeout(
        Duration::from_secs(timeout_seconds),
        state.pipeline.relay(request),
    )
    .await
    .map_err(|_| RelayHandlerError::Timeout {
        seconds: timeout_seconds,
    })??;

    Ok(Json(RelayResponse {
        event_id: outcome.event_id,
        status: "forwarded".to_string(),
        downstream_status: outcome.downstream_status,
    }))
}

/// Lower-cased header map; the first value wins for repeated headers
fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_lowercase())
            .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

fn is_length_limit_error(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            return true;
        }
        source = e.source();
    }
    false
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// This middleware:
/// - Extracts or generates correlation IDs for request tracking
/// - Logs request start and completion with structured fields
/// - Propagates correlation ID through response headers
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<CorrelationId>().ok())
        .unwrap_or_default();

    tracing::Span::current().record("correlation_id", correlation_id.as_str().as_str());

    request.extensions_mut().insert(correlation_id.clone());

    info!(
        correlation_id = %correlation_id,
        method = %method,
        uri = %uri,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.as_str().parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

// ============================================================================
// Response Types
// ============================================================================

/// Successful relay response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayResponse {
    pub event_id: String,
    pub status: String,
    pub downstream_status: u16,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}
