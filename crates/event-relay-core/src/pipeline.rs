//! # Relay Pipeline
//!
//! Runs the three relay stages for one inbound request:
//! extract → log the received event → build envelope → forward → log the
//! downstream response.
//!
//! Any stage failure ends the request. The failure is logged here and
//! returned to the caller, which decides how to answer the sender; the
//! pipeline itself never panics or exits on a bad request.

use crate::envelope::{EnvelopeError, OutboundEnvelope};
use crate::event::{CloudEventHeaders, ExtractionError, ExtractionOptions, InboundEvent};
use crate::forwarder::{EventForwarder, ForwardError, ForwardResponse};
use crate::ErrorCategory;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

/// Everything the pipeline needs from one inbound request
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub headers: CloudEventHeaders,
    pub body: Bytes,
}

impl RelayRequest {
    /// Create new relay request
    pub fn new(headers: CloudEventHeaders, body: Bytes) -> Self {
        Self { headers, body }
    }
}

/// Result of a successful relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Identifier of the relayed event, as received
    pub event_id: String,

    /// Status code returned by the downstream
    pub downstream_status: u16,

    /// Body returned by the downstream
    pub downstream_body: Bytes,
}

/// Stateless relay shared by all requests
#[derive(Clone)]
pub struct RelayPipeline {
    forwarder: Arc<dyn EventForwarder>,
    options: ExtractionOptions,
}

impl RelayPipeline {
    /// Create a pipeline delivering through the given forwarder
    pub fn new(forwarder: Arc<dyn EventForwarder>, options: ExtractionOptions) -> Self {
        Self { forwarder, options }
    }

    /// Extraction settings in effect
    pub fn options(&self) -> ExtractionOptions {
        self.options
    }

    /// Relay one request downstream.
    ///
    /// # Errors
    /// Returns the first stage failure. The failure has already been logged
    /// when this returns.
    #[instrument(skip(self, request), fields(event_id = %request.headers.id))]
    pub async fn relay(&self, request: RelayRequest) -> Result<RelayOutcome, RelayError> {
        let result = self.run(request).await;

        if let Err(ref e) = result {
            error!(
                error = %e,
                stage = e.stage(),
                category = ?e.error_category(),
                "Relay failed"
            );
        }

        result
    }

    async fn run(&self, request: RelayRequest) -> Result<RelayOutcome, RelayError> {
        let event = InboundEvent::extract(request.headers, request.body, self.options)?;
        log_received_event(&event);

        let envelope = OutboundEnvelope::build(&event)?;
        let response = self.forwarder.forward(&envelope).await?;
        log_downstream_response(&envelope, &response);

        Ok(RelayOutcome {
            event_id: envelope.id,
            downstream_status: response.status,
            downstream_body: response.body,
        })
    }
}

fn log_received_event(event: &InboundEvent) {
    match event.to_log_json() {
        Ok(json) => info!(event = %json, "Cloud event received"),
        // Not fatal: the event is still relayed
        Err(e) => warn!(error = %e, "Cloud event received but could not be rendered for logging"),
    }
}

fn log_downstream_response(envelope: &OutboundEnvelope, response: &ForwardResponse) {
    if response.is_success() {
        info!(
            event_id = %envelope.id,
            status = response.status,
            body = %response.body_text(),
            "Downstream response received"
        );
    } else {
        warn!(
            event_id = %envelope.id,
            status = response.status,
            body = %response.body_text(),
            "Downstream response received"
        );
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of any relay stage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Envelope construction failed: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Forwarding failed: {0}")]
    Forward(#[from] ForwardError),
}

impl RelayError {
    /// Check if a later attempt could succeed without changing the request
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Extraction(_) => false,
            Self::Envelope(_) => false,
            Self::Forward(e) => e.is_transient(),
        }
    }

    /// Get error category for logging and status mapping
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Extraction(_) => ErrorCategory::Permanent,
            Self::Envelope(_) => ErrorCategory::Permanent,
            Self::Forward(e) if e.is_transient() => ErrorCategory::Transient,
            Self::Forward(_) => ErrorCategory::Internal,
        }
    }

    /// Name of the stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "extract",
            Self::Envelope(_) => "build",
            Self::Forward(_) => "forward",
        }
    }
}
