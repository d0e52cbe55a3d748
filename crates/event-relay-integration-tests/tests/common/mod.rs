//! Common test utilities for event-relay integration tests
//!
//! This module provides:
//! - Router construction against a given downstream endpoint
//! - Request builders for binary-mode CloudEvents
//! - In-memory log capture for asserting on emitted log lines

use axum::{body::Body, http::Request, Router};
use event_relay_api::{create_router, AppState, ServiceConfig};
use event_relay_core::{DirektivForwarder, RelayPipeline};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

// ============================================================================
// Application Setup
// ============================================================================

/// Token configured for every test app, with the newline a mounted secret has
#[allow(dead_code)]
pub const TEST_TOKEN: &str = "test-token\n";

/// Namespace configured for every test app
#[allow(dead_code)]
pub const TEST_NAMESPACE: &str = "audit";

/// Build the full router relaying to `endpoint`
#[allow(dead_code)]
pub fn create_test_app(endpoint: &str) -> Router {
    let mut config = ServiceConfig::default();
    config.downstream.endpoint = endpoint.to_string();
    config.downstream.namespace = TEST_NAMESPACE.to_string();
    config.downstream.token = TEST_TOKEN.to_string();
    config.downstream.timeout_seconds = 5;

    let forwarder = DirektivForwarder::new(config.forwarder_config())
        .expect("forwarder should build with a valid config");
    let pipeline = RelayPipeline::new(Arc::new(forwarder), config.extraction);

    create_router(AppState::new(config, pipeline))
}

/// Address nothing is listening on
#[allow(dead_code)]
pub async fn closed_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

// ============================================================================
// Request Builders
// ============================================================================

/// Binary-mode CloudEvent request with the given attributes
#[allow(dead_code)]
pub fn cloud_event_request(id: &str, time: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("ce-id", id)
        .header("ce-source", "src-a")
        .header("ce-specversion", "1.0")
        .header("ce-type", "audit.log")
        .header("ce-time", time)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

/// Parse a response body as JSON
#[allow(dead_code)]
pub async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Log Capture
// ============================================================================

/// Shared in-memory sink for formatted log lines
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Everything logged so far
    #[allow(dead_code)]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route this thread's log output into a [`LogCapture`] until the guard drops.
///
/// Use with a current-thread runtime so every log line lands on this thread.
#[allow(dead_code)]
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
