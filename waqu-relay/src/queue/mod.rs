//! Queue backends for relayed webhook payloads.
//!
//! Every backend implements [`Enqueuer`]: take the raw body, durably hand it off,
//! return the identifier the backend assigned. The relay makes exactly one
//! `enqueue` call per accepted request and never retries.
//!
//! ## Backends
//!
//! ```text
//! pubsub → projects/{project}/topics/{topic}:publish
//! tasks  → projects/{project}/locations/{location}/queues/{queue}/tasks
//! amqp   → durable queue on a publisher-confirm channel
//! ```

pub mod amqp;
pub mod error;
pub mod gcp_auth;
pub mod pubsub;
pub mod tasks;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::config::BackendConfig;

pub use amqp::AmqpPublisher;
pub use error::EnqueueError;
pub use gcp_auth::TokenSource;
pub use pubsub::PubSubPublisher;
pub use tasks::TaskDispatcher;

/// Durable hand-off of a raw payload.
///
/// A returned identifier means the backend has accepted responsibility for the
/// payload, not that it is merely buffered in this process.
#[async_trait]
pub trait Enqueuer: Send + Sync {
    /// Enqueue `payload` unchanged and return the backend-assigned identifier.
    async fn enqueue(&self, payload: &[u8]) -> Result<String, EnqueueError>;

    /// Release backend resources on shutdown.
    async fn close(&self) {}
}

/// Build the configured backend and verify its destination exists.
pub async fn connect(backend: &BackendConfig) -> Result<Arc<dyn Enqueuer>, EnqueueError> {
    let enqueuer: Arc<dyn Enqueuer> = match backend {
        BackendConfig::PubSub {
            project_id,
            topic_id,
            endpoint,
            emulator,
            access_token,
        } => {
            let client = Client::new();
            let tokens = if *emulator {
                TokenSource::Anonymous
            } else {
                TokenSource::new(client.clone(), access_token.clone())
            };
            let publisher = PubSubPublisher::new(client, endpoint, project_id, topic_id, tokens);
            publisher.verify_topic().await?;
            Arc::new(publisher)
        }
        BackendConfig::Tasks {
            project_id,
            location_id,
            queue_id,
            target_url,
            target_token,
            endpoint,
            access_token,
        } => {
            let client = Client::new();
            let tokens = TokenSource::new(client.clone(), access_token.clone());
            let dispatcher = TaskDispatcher::new(
                client,
                endpoint,
                project_id,
                location_id,
                queue_id,
                target_url.clone(),
                target_token.clone(),
                tokens,
            );
            dispatcher.verify_queue().await?;
            Arc::new(dispatcher)
        }
        BackendConfig::Amqp { url, queue } => {
            Arc::new(AmqpPublisher::connect(url.clone(), queue.clone()).await?)
        }
    };

    info!(backend = backend.kind(), "queue_backend_ready");

    Ok(enqueuer)
}

/// Map a non-success HTTP response to [`EnqueueError::Rejected`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, EnqueueError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(EnqueueError::Rejected {
        status: status.as_u16(),
        body: truncate(body, 512),
    })
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
