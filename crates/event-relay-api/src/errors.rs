//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use event_relay_core::{ErrorCategory, RelayError};
use tracing::{error, warn};

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Seconds a sender is asked to wait after a transient downstream failure
const TRANSIENT_RETRY_AFTER_SECONDS: u64 = 60;

/// Seconds a sender is asked to wait after the relay timed out
const TIMEOUT_RETRY_AFTER_SECONDS: u64 = 5;

/// Relay handler errors with HTTP status code mapping
///
/// Every variant ends the current request only; the service keeps serving.
///
/// - `400 Bad Request`: the inbound event itself is unusable (bad
///   timestamp, missing attribute, unreadable body, not a valid CloudEvent)
/// - `408 Request Timeout`: relaying took longer than the server timeout
/// - `413 Payload Too Large`: body exceeds the configured maximum
/// - `500 Internal Server Error`: the relay could not build its downstream
///   request; details are logged, a generic message is returned
/// - `503 Service Unavailable`: the downstream could not be reached or its
///   response could not be read; includes `Retry-After`
#[derive(Debug, thiserror::Error)]
pub enum RelayHandlerError {
    /// A relay stage failed
    #[error("{0}")]
    Relay(#[from] RelayError),

    /// Request timeout
    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// Payload too large
    #[error("Payload too large: {size} bytes (max: {max_size} bytes)")]
    PayloadTooLarge { size: usize, max_size: usize },

    /// Body without a declared length grew past the limit while reading
    #[error("Payload too large: exceeds {max_size} bytes")]
    BodyLimitExceeded { max_size: usize },
}

impl IntoResponse for RelayHandlerError {
    fn into_response(self) -> Response {
        let (status, message, retry_after) = match self {
            Self::Relay(ref e) => match e.error_category() {
                ErrorCategory::Permanent => (StatusCode::BAD_REQUEST, self.to_string(), None),
                ErrorCategory::Transient => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    self.to_string(),
                    Some(TRANSIENT_RETRY_AFTER_SECONDS),
                ),
                ErrorCategory::Internal => {
                    // Log detailed error server-side but return generic message to client
                    error!(error = %e, "Internal relay error occurred");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error occurred. Please try again later.".to_string(),
                        None,
                    )
                }
            },
            Self::Timeout { seconds } => {
                warn!(timeout_seconds = seconds, "Request timeout");
                (
                    StatusCode::REQUEST_TIMEOUT,
                    self.to_string(),
                    Some(TIMEOUT_RETRY_AFTER_SECONDS),
                )
            }
            Self::PayloadTooLarge { size, max_size } => {
                warn!(
                    payload_size = size,
                    max_size = max_size,
                    "Payload too large"
                );
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string(), None)
            }
            Self::BodyLimitExceeded { max_size } => {
                warn!(max_size = max_size, "Payload too large while reading body");
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string(), None)
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Loading(#[from] config::ConfigError),
}
