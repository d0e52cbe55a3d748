//! Tests for the HTTP router, relay handler and middleware

use super::*;
use axum::http::{Request, StatusCode};
use event_relay_core::{
    EventForwarder, ExtractionOptions, ForwardError, ForwardResponse, OutboundEnvelope,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

/// Forwarder answering every envelope with a fixed response
struct StubForwarder {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl StubForwarder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }
}

#[async_trait::async_trait]
impl EventForwarder for StubForwarder {
    async fn forward(&self, _envelope: &OutboundEnvelope) -> Result<ForwardResponse, ForwardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ForwardResponse {
            status: 200,
            body: bytes::Bytes::from_static(b"{}"),
        })
    }
}

fn app_with(forwarder: Arc<StubForwarder>, config: ServiceConfig) -> Router {
    let pipeline = RelayPipeline::new(forwarder, ExtractionOptions::default());
    create_router(AppState::new(config, pipeline))
}

fn event_request(time: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("ce-id", "evt-1")
        .header("ce-source", "src-a")
        .header("ce-specversion", "1.0")
        .header("ce-type", "audit.log")
        .header("ce-time", time)
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

mod handler_tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_event_is_forwarded() {
        let forwarder = Arc::new(StubForwarder::new());
        let app = app_with(forwarder.clone(), ServiceConfig::default());

        let response = app
            .oneshot(event_request("2024-01-01T00:00:00Z", r#"{"k":"v"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["event_id"], "evt-1");
        assert_eq!(body["status"], "forwarded");
        assert_eq!(body["downstream_status"], 200);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_any_method_is_accepted() {
        let forwarder = Arc::new(StubForwarder::new());
        let app = app_with(forwarder.clone(), ServiceConfig::default());

        let mut request = event_request("2024-01-01T00:00:00Z", "{}");
        *request.method_mut() = axum::http::Method::PUT;

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_time_returns_400_without_forwarding() {
        let forwarder = Arc::new(StubForwarder::new());
        let app = app_with(forwarder.clone(), ServiceConfig::default());

        let response = app
            .oneshot(event_request("not-a-time", "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_returns_413() {
        let forwarder = Arc::new(StubForwarder::new());
        let mut config = ServiceConfig::default();
        config.server.max_body_size = 8;
        let app = app_with(forwarder.clone(), config);

        let mut request = event_request("2024-01-01T00:00:00Z", r#"{"too":"large"}"#);
        request
            .headers_mut()
            .insert("content-length", "15".parse().unwrap());

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_without_content_length_returns_413() {
        let forwarder = Arc::new(StubForwarder::new());
        let mut config = ServiceConfig::default();
        config.server.max_body_size = 8;
        let app = app_with(forwarder.clone(), config);

        let request = event_request("2024-01-01T00:00:00Z", r#"{"too":"large"}"#);
        assert!(request.headers().get("content-length").is_none());

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_body_at_limit_is_accepted() {
        let forwarder = Arc::new(StubForwarder::new());
        let mut config = ServiceConfig::default();
        config.server.max_body_size = 9;
        let app = app_with(forwarder.clone(), config);

        let response = app
            .oneshot(event_request("2024-01-01T00:00:00Z", r#"{"k":"v"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_relay_returns_408() {
        let forwarder = Arc::new(StubForwarder::slow(Duration::from_secs(120)));
        let mut config = ServiceConfig::default();
        config.server.timeout_seconds = 1;
        let app = app_with(forwarder, config);

        let response = app
            .oneshot(event_request("2024-01-01T00:00:00Z", "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}

mod middleware_tests {
    use super::*;

    #[tokio::test]
    async fn test_correlation_id_is_generated() {
        let app = app_with(Arc::new(StubForwarder::new()), ServiceConfig::default());

        let response = app
            .oneshot(event_request("2024-01-01T00:00:00Z", "{}"))
            .await
            .unwrap();

        let header = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(header.parse::<CorrelationId>().is_ok());
    }

    #[tokio::test]
    async fn test_correlation_id_is_propagated() {
        let app = app_with(Arc::new(StubForwarder::new()), ServiceConfig::default());
        let correlation_id = CorrelationId::new();

        let mut request = event_request("not-a-time", "{}");
        request.headers_mut().insert(
            CORRELATION_ID_HEADER,
            correlation_id.as_str().parse().unwrap(),
        );

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response
                .headers()
                .get(CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some(correlation_id.as_str().as_str())
        );
    }
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_returns_healthy_status() {
        let app = app_with(Arc::new(StubForwarder::new()), ServiceConfig::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}

mod header_tests {
    use super::*;

    #[test]
    fn test_first_value_wins_for_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append("ce-id", "first".parse().unwrap());
        headers.append("ce-id", "second".parse().unwrap());

        let map = headers_to_map(&headers);

        assert_eq!(map.get("ce-id").map(String::as_str), Some("first"));
    }

    #[test]
    fn test_header_names_are_lower_cased() {
        let mut headers = HeaderMap::new();
        headers.insert("CE-Time", "2024-01-01T00:00:00Z".parse().unwrap());

        let map = headers_to_map(&headers);

        assert!(map.contains_key("ce-time"));
    }
}
