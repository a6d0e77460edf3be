//! The relay pipeline: authenticate, classify, enqueue.
//!
//! The HTTP response is only produced after the single enqueue attempt resolves,
//! so the webhook sender sees success only once the payload is durably queued.
//! Anything else gets a non-2xx status and the sender's own redelivery takes over.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info, warn};

use crate::notification::is_message_event;
use crate::queue::{EnqueueError, Enqueuer};
use crate::web::auth::authenticate;
use crate::Config;

/// What happened to one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Bearer token missing or wrong.
    Unauthorized,
    /// The request body could not be read off the connection.
    BodyUnreadable,
    /// Filtering is on and the payload holds no user message.
    Skipped,
    /// The payload was accepted by the queue under this identifier.
    Enqueued(String),
    /// The queue backend failed; nothing was enqueued.
    EnqueueFailed,
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Unauthorized => StatusCode::UNAUTHORIZED,
            Outcome::BodyUnreadable | Outcome::EnqueueFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Outcome::Skipped | Outcome::Enqueued(_) => StatusCode::OK,
        }
    }
}

/// Outcomes never carry a body; error detail stays in the logs.
impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}

/// Request handler state, built once at startup and shared read-only.
pub struct Relay {
    token: String,
    ignore_status: bool,
    queue: Arc<dyn Enqueuer>,
}

impl Relay {
    pub fn new(config: &Config, queue: Arc<dyn Enqueuer>) -> Self {
        Self {
            token: config.token.clone(),
            ignore_status: config.ignore_status,
            queue,
        }
    }

    /// Handle one webhook delivery.
    ///
    /// The body is only read after authentication succeeds and is forwarded
    /// exactly as received.
    pub async fn handle(&self, headers: &HeaderMap, body: Body) -> Outcome {
        if !authenticate(headers, &self.token) {
            warn!("waqu_unauthorized");
            return Outcome::Unauthorized;
        }

        let body = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(reason = %e, "waqu_body_read_failed");
                return Outcome::BodyUnreadable;
            }
        };

        if self.ignore_status && !is_message_event(&body) {
            debug!(body_length = body.len(), "waqu_non_message_skipped");
            return Outcome::Skipped;
        }

        match self.publish(&body).await {
            Ok(id) => {
                info!(id = %id, body_length = body.len(), "waqu_enqueued");
                Outcome::Enqueued(id)
            }
            Err(e) => {
                error!(reason = %e, "waqu_enqueue_failed");
                Outcome::EnqueueFailed
            }
        }
    }

    /// One enqueue attempt, no retry.
    async fn publish(&self, body: &[u8]) -> Result<String, EnqueueError> {
        self.queue.enqueue(body).await
    }
}
