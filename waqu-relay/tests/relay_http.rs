//! Integration tests for the `POST /waqu` endpoint.
//!
//! Requests go through the full router with a recording queue backend in place
//! of Pub/Sub, so every test can assert exactly what was enqueued.

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use waqu::web::{router, AppState};
use waqu::{BackendConfig, Config, EnqueueError, Enqueuer, Relay};

const MESSAGE_EVENT: &str = r#"{"entry":[{"changes":[{"value":{"messages":[{"id":"m1"}]}}}]}}"#;
const EMPTY_MESSAGES: &str = r#"{"entry":[{"changes":[{"value":{"messages":[]}}}]}}"#;

/// Queue backend that records every payload it is given.
#[derive(Default)]
struct RecordingQueue {
    payloads: Mutex<Vec<Vec<u8>>>,
    fail: bool,
}

impl RecordingQueue {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Enqueuer for RecordingQueue {
    async fn enqueue(&self, payload: &[u8]) -> Result<String, EnqueueError> {
        self.payloads.lock().unwrap().push(payload.to_vec());
        if self.fail {
            return Err(EnqueueError::Rejected {
                status: 503,
                body: "topic unavailable".to_string(),
            });
        }
        Ok(format!("msg-{}", self.payloads.lock().unwrap().len()))
    }
}

fn test_app(ignore_status: bool, queue: Arc<RecordingQueue>) -> Router {
    let config = Config {
        token: "secret".to_string(),
        port: 0,
        ignore_status,
        backend: BackendConfig::PubSub {
            project_id: "test-project".to_string(),
            topic_id: "webhooks".to_string(),
            endpoint: "http://localhost:8085".to_string(),
            emulator: true,
            access_token: None,
        },
    };
    router(AppState::new(Relay::new(&config, queue)))
}

fn webhook(token: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::POST).uri("/waqu");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body.into()).expect("request build")
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body extraction")
}

/// A message event with a trailing stray brace is still forwarded byte-for-byte.
#[tokio::test]
async fn message_event_is_forwarded_unmodified() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(true, queue.clone());

    let response = app
        .oneshot(webhook(Some("secret"), MESSAGE_EVENT))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(queue.payloads(), vec![MESSAGE_EVENT.as_bytes().to_vec()]);
}

#[tokio::test]
async fn empty_messages_are_dropped_silently() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(true, queue.clone());

    let response = app
        .oneshot(webhook(Some("secret"), EMPTY_MESSAGES))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(queue.payloads().is_empty());
}

#[tokio::test]
async fn status_notification_is_dropped_silently() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(true, queue.clone());

    let body = r#"{"object":"whatsapp_business_account","entry":[{"id":"1","changes":[{"field":"messages","value":{"statuses":[{"status":"read"}]}}]}]}"#;
    let response = app
        .oneshot(webhook(Some("secret"), body))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(queue.payloads().is_empty());
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(true, queue.clone());

    let response = app
        .oneshot(webhook(Some("wrong"), MESSAGE_EVENT))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_bytes(response).await.is_empty());
    assert!(queue.payloads().is_empty());
}

#[tokio::test]
async fn missing_authorization_is_rejected() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(false, queue.clone());

    let response = app
        .oneshot(webhook(None, MESSAGE_EVENT))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(queue.payloads().is_empty());
}

/// Authentication happens before the body is touched, so even an unreadable
/// body yields 401 rather than 500.
#[tokio::test]
async fn unauthorized_request_body_is_never_read() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(true, queue.clone());

    let response = app
        .oneshot(webhook(Some("wrong"), broken_body()))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(queue.payloads().is_empty());
}

#[tokio::test]
async fn filtering_disabled_forwards_non_json() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(false, queue.clone());

    let response = app
        .oneshot(webhook(Some("secret"), "not json"))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(queue.payloads(), vec![b"not json".to_vec()]);
}

#[tokio::test]
async fn filtering_disabled_forwards_status_notifications() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(false, queue.clone());

    let response = app
        .oneshot(webhook(Some("secret"), EMPTY_MESSAGES))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(queue.payloads(), vec![EMPTY_MESSAGES.as_bytes().to_vec()]);
}

/// With filtering on, a body that is not JSON at all is treated like a
/// notification without messages: acknowledged and dropped, never a 400.
#[tokio::test]
async fn filtering_enabled_drops_undecodable_body_with_ok() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(true, queue.clone());

    let response = app
        .oneshot(webhook(Some("secret"), "not json"))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(queue.payloads().is_empty());
}

#[tokio::test]
async fn forwarded_bytes_are_identical_to_received_bytes() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(false, queue.clone());

    let body: Vec<u8> = (0u8..=255).chain(b"{\"entry\": [ ] }\r\n".iter().copied()).collect();
    let response = app
        .oneshot(webhook(Some("secret"), body.clone()))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(queue.payloads(), vec![body]);
}

#[tokio::test]
async fn whitespace_and_key_order_survive_forwarding() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(true, queue.clone());

    let body = "{ \"object\" : \"x\",\n  \"entry\": [{\"changes\": [{\"value\": {\"messages\": [{\"id\": \"m1\"}], \"a\": 1.50}}]}] }";
    let response = app
        .oneshot(webhook(Some("secret"), body))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(queue.payloads(), vec![body.as_bytes().to_vec()]);
}

#[tokio::test]
async fn enqueue_failure_returns_500_without_detail() {
    let queue = Arc::new(RecordingQueue::failing());
    let app = test_app(true, queue.clone());

    let response = app
        .oneshot(webhook(Some("secret"), MESSAGE_EVENT))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_bytes(response).await.is_empty());
    // Exactly one attempt, no retry
    assert_eq!(queue.payloads().len(), 1);
}

#[tokio::test]
async fn body_read_failure_returns_500() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(false, queue.clone());

    let response = app
        .oneshot(webhook(Some("secret"), broken_body()))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_bytes(response).await.is_empty());
    assert!(queue.payloads().is_empty());
}

#[tokio::test]
async fn only_post_waqu_is_routed() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(false, queue.clone());

    let get = Request::builder()
        .method(Method::GET)
        .uri("/waqu")
        .header(AUTHORIZATION, "Bearer secret")
        .body(Body::empty())
        .expect("request build");
    let response = app.clone().oneshot(get).await.expect("request execution");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let other = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header(AUTHORIZATION, "Bearer secret")
        .body(Body::from("x"))
        .expect("request build");
    let response = app.oneshot(other).await.expect("request execution");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(queue.payloads().is_empty());
}

#[tokio::test]
async fn concurrent_requests_each_enqueue_once() {
    let queue = Arc::new(RecordingQueue::default());
    let app = test_app(true, queue.clone());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                app.oneshot(webhook(Some("secret"), MESSAGE_EVENT))
                    .await
                    .expect("request execution")
                    .status()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.expect("task join"), StatusCode::OK);
    }
    assert_eq!(queue.payloads().len(), 16);
}

/// A body stream that fails part-way through.
fn broken_body() -> Body {
    let chunks: Vec<Result<Bytes, io::Error>> = vec![
        Ok(Bytes::from_static(b"{\"entry\":")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
    ];
    Body::from_stream(futures::stream::iter(chunks))
}
