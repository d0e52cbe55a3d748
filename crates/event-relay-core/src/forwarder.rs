//! # Envelope Forwarding
//!
//! Posts serialized envelopes to the Direktiv namespace broadcast endpoint.
//!
//! One [`DirektivForwarder`] is built at start-up and shared by every
//! request. Its HTTP client and configuration are never modified after
//! construction. Each call makes exactly one attempt; there is no retry.

use crate::envelope::OutboundEnvelope;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "forwarder_tests.rs"]
mod tests;

/// Header carrying the Direktiv access token
pub const TOKEN_HEADER: &str = "direktiv-token";

/// Content type of a structured-mode CloudEvent
pub const CLOUDEVENTS_CONTENT_TYPE: &str = "application/cloudevents+json; charset=utf-8";

/// Token value as sent on the wire.
///
/// Tokens mounted from secret files usually end in a newline. Exactly one
/// trailing `\n` is removed; nothing else is trimmed.
pub fn auth_token_value(raw: &str) -> &str {
    raw.strip_suffix('\n').unwrap_or(raw)
}

// ============================================================================
// Configuration
// ============================================================================

/// Downstream settings for a [`DirektivForwarder`]
#[derive(Clone)]
pub struct ForwarderConfig {
    /// Direktiv API base URL, e.g. `https://direktiv.example.com`
    pub endpoint: String,

    /// Namespace receiving the broadcast
    pub namespace: String,

    /// Access token, exactly as configured
    pub token: Zeroizing<String>,

    /// Upper bound for one complete request/response exchange
    pub timeout: Duration,

    /// User agent sent with every request
    pub user_agent: String,
}

impl ForwarderConfig {
    /// Create a configuration with default timeout and user agent
    pub fn new(
        endpoint: impl Into<String>,
        namespace: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: namespace.into(),
            token: Zeroizing::new(token.into()),
            timeout: Duration::from_secs(30),
            user_agent: format!("event-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// `<endpoint>/api/namespaces/<namespace>/broadcast`, concatenated as-is
    pub fn broadcast_url(&self) -> String {
        format!(
            "{}/api/namespaces/{}/broadcast",
            self.endpoint, self.namespace
        )
    }
}

impl fmt::Debug for ForwarderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwarderConfig")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("token", &"<REDACTED>")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

// ============================================================================
// Forwarder
// ============================================================================

/// Downstream response, kept whole for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ForwardResponse {
    /// Whether the downstream reported success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text for log output, replacing invalid UTF-8
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Delivers an envelope to its destination
#[async_trait]
pub trait EventForwarder: Send + Sync {
    /// Send one envelope and return the complete downstream response
    async fn forward(&self, envelope: &OutboundEnvelope) -> Result<ForwardResponse, ForwardError>;
}

/// [`EventForwarder`] posting to a Direktiv namespace broadcast endpoint
#[derive(Debug, Clone)]
pub struct DirektivForwarder {
    config: ForwarderConfig,
    http_client: reqwest::Client,
}

impl DirektivForwarder {
    /// Build the forwarder and its HTTP client.
    ///
    /// # Errors
    /// Returns [`ForwardError::RequestConstruction`] when the HTTP client
    /// cannot be initialised (for example, no TLS backend is available).
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwardError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ForwardError::RequestConstruction {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Configuration this forwarder was built with
    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    fn broadcast_url(&self) -> Result<Url, ForwardError> {
        let raw = self.config.broadcast_url();
        Url::parse(&raw).map_err(|e| ForwardError::RequestConstruction {
            message: format!("invalid broadcast URL '{}': {}", raw, e),
        })
    }

    fn token_header(&self) -> Result<HeaderValue, ForwardError> {
        let mut value = HeaderValue::from_str(auth_token_value(&self.config.token)).map_err(
            |_| ForwardError::RequestConstruction {
                message: format!("{} contains characters not allowed in a header", TOKEN_HEADER),
            },
        )?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[async_trait]
impl EventForwarder for DirektivForwarder {
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id, namespace = %self.config.namespace))]
    async fn forward(&self, envelope: &OutboundEnvelope) -> Result<ForwardResponse, ForwardError> {
        let body = envelope
            .to_json_bytes()
            .map_err(|e| ForwardError::Serialization {
                message: e.to_string(),
            })?;

        let url = self.broadcast_url()?;
        let token = self.token_header()?;

        debug!(url = %url, body_size = body.len(), "Sending envelope downstream");

        let response = self
            .http_client
            .post(url)
            .header(TOKEN_HEADER, token)
            .header(CONTENT_TYPE, CLOUDEVENTS_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(ForwardError::from_send_error)?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ForwardError::ResponseRead {
                message: e.to_string(),
            })?;

        Ok(ForwardResponse { status, body })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures while delivering an envelope downstream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("Failed to serialize envelope: {message}")]
    Serialization { message: String },

    #[error("Failed to construct downstream request: {message}")]
    RequestConstruction { message: String },

    #[error("Downstream transport failure: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("Failed to read downstream response: {message}")]
    ResponseRead { message: String },
}

impl ForwardError {
    /// Check if a later attempt could succeed without changing the request
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Serialization { .. } => false,
            Self::RequestConstruction { .. } => false,
            Self::Transport { .. } => true,
            Self::ResponseRead { .. } => true,
        }
    }

    fn from_send_error(error: reqwest::Error) -> Self {
        if error.is_builder() {
            return Self::RequestConstruction {
                message: error.to_string(),
            };
        }

        Self::Transport {
            timed_out: error.is_timeout(),
            message: error.to_string(),
        }
    }
}
