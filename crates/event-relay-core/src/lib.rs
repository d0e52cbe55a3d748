//! # Event-Relay Core
//!
//! Core logic for the event-relay webhook adapter.
//!
//! An inbound CloudEvent arrives in binary mode (attributes as `ce-*` HTTP
//! headers, payload as the raw body). The core turns it into a structured
//! CloudEvents envelope and relays it to a Direktiv namespace broadcast
//! endpoint.
//!
//! ## Architecture
//!
//! The relay is a linear pipeline, run once per inbound request:
//! - [`event`]: extracts an [`InboundEvent`] from headers and body
//! - [`envelope`]: maps the event into an [`OutboundEnvelope`]
//! - [`forwarder`]: posts the serialized envelope downstream
//! - [`pipeline`]: sequences the stages and logs around them
//!
//! No stage keeps state between requests. The only shared resource is the
//! forwarder's HTTP client, which is read-only once built.
//!
//! ## Usage
//!
//! ```rust
//! use event_relay_core::{EventTime, InboundEvent, OutboundEnvelope};
//!
//! let event = InboundEvent {
//!     id: "evt-1".to_string(),
//!     source: "src-a".to_string(),
//!     spec_version: "1.0".to_string(),
//!     event_type: "audit.log".to_string(),
//!     time: EventTime::from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
//!     payload: bytes::Bytes::from_static(br#"{"k":"v"}"#),
//! };
//!
//! let envelope = OutboundEnvelope::build(&event).unwrap();
//! assert_eq!(envelope.id, "evt-1");
//! ```

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub use uuid::Uuid;

// ============================================================================
// Time Types
// ============================================================================

/// Event timestamp as received from the sender.
///
/// Keeps the UTC offset the sender used so the received event can be logged
/// as-is. Equality compares instants, so `2024-01-01T02:00:00+02:00` equals
/// `2024-01-01T00:00:00Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTime(DateTime<FixedOffset>);

impl EventTime {
    /// Parse an RFC 3339 timestamp. No other format is accepted.
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s).map_err(|_| ParseError::InvalidFormat {
            expected: "RFC3339 datetime".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(dt))
    }

    /// Format in RFC 3339 with the original offset.
    ///
    /// Fractional seconds are written only when present, using the shortest
    /// of milli/micro/nano precision that preserves them.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// The same instant in UTC
    pub fn to_utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }
}

impl From<DateTime<Utc>> for EventTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.fixed_offset())
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl FromStr for EventTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_rfc3339(s)
    }
}

impl Serialize for EventTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

// ============================================================================
// Request Metadata
// ============================================================================

/// Identifier for tracing a request across log lines and system boundaries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

// ============================================================================
// Shared Errors
// ============================================================================

/// Broad classification of a failure, used for logging and status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The request itself is at fault; resending it unchanged will fail again
    Permanent,
    /// The downstream was unreachable or misbehaved; a later attempt may work
    Transient,
    /// A defect in this service or its configuration
    Internal,
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Extraction of inbound events from HTTP headers and body
pub mod event;

/// Structured CloudEvents envelope construction
pub mod envelope;

/// Delivery of envelopes to the downstream broadcast endpoint
pub mod forwarder;

/// Per-request orchestration of the relay stages
pub mod pipeline;

// Re-export key types for convenience
pub use envelope::{EnvelopeData, EnvelopeError, OutboundEnvelope};
pub use event::{CloudEventHeaders, ExtractionError, ExtractionOptions, InboundEvent};
pub use forwarder::{
    DirektivForwarder, EventForwarder, ForwardError, ForwardResponse, ForwarderConfig,
};
pub use pipeline::{RelayError, RelayOutcome, RelayPipeline, RelayRequest};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
