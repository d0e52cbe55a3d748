//! # Inbound Event Extraction
//!
//! Reads CloudEvents binary-mode attributes from request headers and pairs
//! them with the raw request body.

use crate::EventTime;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

/// Header carrying the event identifier
pub const HEADER_ID: &str = "ce-id";
/// Header carrying the event source URI
pub const HEADER_SOURCE: &str = "ce-source";
/// Header carrying the CloudEvents spec version
pub const HEADER_SPEC_VERSION: &str = "ce-specversion";
/// Header carrying the event type
pub const HEADER_TYPE: &str = "ce-type";
/// Header carrying the event timestamp
pub const HEADER_TIME: &str = "ce-time";

// ============================================================================
// Headers
// ============================================================================

/// Raw CloudEvents attribute headers, exactly as received.
///
/// Absent headers are represented as empty strings; nothing here is
/// validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudEventHeaders {
    pub id: String,           // ce-id
    pub source: String,       // ce-source
    pub spec_version: String, // ce-specversion
    pub event_type: String,   // ce-type
    pub time: String,         // ce-time
}

impl CloudEventHeaders {
    /// Pick the `ce-*` headers out of a header map with lower-cased keys
    pub fn from_http_headers(headers: &HashMap<String, String>) -> Self {
        let get = |name: &str| headers.get(name).cloned().unwrap_or_default();

        Self {
            id: get(HEADER_ID),
            source: get(HEADER_SOURCE),
            spec_version: get(HEADER_SPEC_VERSION),
            event_type: get(HEADER_TYPE),
            time: get(HEADER_TIME),
        }
    }
}

/// Knobs for the extraction stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOptions {
    /// Reject events whose `ce-id`, `ce-source`, `ce-specversion` or
    /// `ce-type` header is missing or empty.
    ///
    /// Off by default: empty attributes pass through as empty strings.
    #[serde(default)]
    pub require_fields: bool,
}

// ============================================================================
// Inbound Event
// ============================================================================

/// An event as received, before it is shaped into an envelope.
///
/// Built fresh for every request and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundEvent {
    pub id: String,

    pub source: String,

    #[serde(rename = "specversion")]
    pub spec_version: String,

    /// Request body, never interpreted. Logged as base64.
    #[serde(rename = "data", serialize_with = "serialize_base64")]
    pub payload: Bytes,

    #[serde(rename = "type")]
    pub event_type: String,

    pub time: EventTime,
}

impl InboundEvent {
    /// Build an event from the attribute headers and the fully read body.
    ///
    /// The time header must be RFC 3339; there is no fallback format and no
    /// default timestamp.
    pub fn extract(
        headers: CloudEventHeaders,
        body: Bytes,
        options: ExtractionOptions,
    ) -> Result<Self, ExtractionError> {
        if options.require_fields {
            require_non_empty(HEADER_ID, &headers.id)?;
            require_non_empty(HEADER_SOURCE, &headers.source)?;
            require_non_empty(HEADER_SPEC_VERSION, &headers.spec_version)?;
            require_non_empty(HEADER_TYPE, &headers.event_type)?;
        }

        let time = EventTime::from_rfc3339(&headers.time).map_err(|_| {
            ExtractionError::MalformedTimestamp {
                value: headers.time.clone(),
            }
        })?;

        Ok(Self {
            id: headers.id,
            source: headers.source,
            spec_version: headers.spec_version,
            event_type: headers.event_type,
            time,
            payload: body,
        })
    }

    /// Render the full record as a single JSON document for the log sink
    pub fn to_log_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ExtractionError> {
    if value.is_empty() {
        return Err(ExtractionError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn serialize_base64<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(payload))
}

// ============================================================================
// Errors
// ============================================================================

/// Failures while turning a request into an [`InboundEvent`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Malformed timestamp in ce-time header: '{value}' is not RFC3339")]
    MalformedTimestamp { value: String },

    #[error("Failed to read request body: {message}")]
    BodyRead { message: String },

    #[error("Required header '{field}' is missing or empty")]
    MissingField { field: String },
}
