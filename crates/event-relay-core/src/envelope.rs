//! # Envelope Construction
//!
//! Maps an [`InboundEvent`] onto a CloudEvents structured-mode envelope.
//!
//! The payload is always tagged `application/json`, whatever it actually
//! contains. Payloads that parse as JSON are embedded verbatim under `data`;
//! anything else is carried base64-encoded under `data_base64` (still tagged
//! as JSON). Downstream consumers rely on the fixed content type, so it is
//! not inferred from the body.

use crate::event::InboundEvent;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;

/// Content type attached to every envelope's data
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// CloudEvents spec versions an envelope may declare
pub const SUPPORTED_SPEC_VERSIONS: [&str; 2] = ["1.0", "0.3"];

// ============================================================================
// Envelope Data
// ============================================================================

/// Payload as it will be written into the envelope
#[derive(Debug, Clone)]
pub enum EnvelopeData {
    /// Empty body; the envelope carries no data member
    Empty,

    /// Body is JSON and is embedded as-is
    Json(Box<RawValue>),

    /// Body is not JSON and is embedded as base64
    Binary(Bytes),
}

impl EnvelopeData {
    /// Decide how a raw payload is carried. Never alters the bytes.
    pub fn from_payload(payload: &Bytes) -> Self {
        if payload.is_empty() {
            return Self::Empty;
        }

        match std::str::from_utf8(payload) {
            Ok(text) => match RawValue::from_string(text.to_owned()) {
                Ok(raw) => Self::Json(raw),
                Err(_) => Self::Binary(payload.clone()),
            },
            Err(_) => Self::Binary(payload.clone()),
        }
    }

    /// Whether the envelope will carry a data member at all
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl PartialEq for EnvelopeData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Json(a), Self::Json(b)) => a.get() == b.get(),
            (Self::Binary(a), Self::Binary(b)) => a == b,
            _ => false,
        }
    }
}

// ============================================================================
// Outbound Envelope
// ============================================================================

/// Structured CloudEvent ready to be sent downstream.
///
/// Immutable once built. Attribute values are copied verbatim from the
/// inbound event; the time is the same instant expressed in UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEnvelope {
    pub id: String,
    pub source: String,
    pub spec_version: String,
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub data_content_type: String,
    pub data: EnvelopeData,
}

impl OutboundEnvelope {
    /// Build the envelope for an inbound event.
    ///
    /// Fails only when the event cannot be expressed as a CloudEvent: `id`,
    /// `source` and `type` must be non-empty and `specversion` must be one of
    /// [`SUPPORTED_SPEC_VERSIONS`].
    pub fn build(event: &InboundEvent) -> Result<Self, EnvelopeError> {
        require_attribute("id", &event.id)?;
        require_attribute("source", &event.source)?;
        require_attribute("type", &event.event_type)?;

        if !SUPPORTED_SPEC_VERSIONS.contains(&event.spec_version.as_str()) {
            return Err(EnvelopeError::ConstraintViolation {
                attribute: "specversion".to_string(),
                message: format!(
                    "unsupported version '{}', expected one of {:?}",
                    event.spec_version, SUPPORTED_SPEC_VERSIONS
                ),
            });
        }

        Ok(Self {
            id: event.id.clone(),
            source: event.source.clone(),
            spec_version: event.spec_version.clone(),
            event_type: event.event_type.clone(),
            time: event.time.to_utc(),
            data_content_type: JSON_CONTENT_TYPE.to_string(),
            data: EnvelopeData::from_payload(&event.payload),
        })
    }

    /// Envelope time in RFC 3339, UTC, with `Z` suffix
    pub fn time_rfc3339(&self) -> String {
        self.time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// Serialize as a CloudEvents JSON document
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn require_attribute(attribute: &str, value: &str) -> Result<(), EnvelopeError> {
    if value.is_empty() {
        return Err(EnvelopeError::ConstraintViolation {
            attribute: attribute.to_string(),
            message: "must be a non-empty string".to_string(),
        });
    }
    Ok(())
}

/// Wire layout of a structured-mode CloudEvent
#[derive(Serialize)]
struct StructuredEvent<'a> {
    specversion: &'a str,
    id: &'a str,
    source: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    datacontenttype: &'a str,
    time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_base64: Option<String>,
}

impl Serialize for OutboundEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let (data, data_base64) = match &self.data {
            EnvelopeData::Empty => (None, None),
            EnvelopeData::Json(raw) => (Some(&**raw), None),
            EnvelopeData::Binary(bytes) => (None, Some(STANDARD.encode(bytes))),
        };

        StructuredEvent {
            specversion: &self.spec_version,
            id: &self.id,
            source: &self.source,
            event_type: &self.event_type,
            datacontenttype: &self.data_content_type,
            time: self.time_rfc3339(),
            data,
            data_base64,
        }
        .serialize(serializer)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures while building an [`OutboundEnvelope`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Envelope attribute '{attribute}' is invalid: {message}")]
    ConstraintViolation { attribute: String, message: String },
}
