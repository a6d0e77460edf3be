//! Google Cloud Pub/Sub topic publisher.
//!
//! Publishes through the REST API: the payload travels base64-encoded in the
//! `data` field and Pub/Sub stores the decoded bytes, so subscribers receive
//! exactly what the webhook sent.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_status, EnqueueError, Enqueuer, TokenSource};

/// Publishes each payload as one Pub/Sub message.
pub struct PubSubPublisher {
    client: Client,
    endpoint: String,
    /// `projects/{project}/topics/{topic}`
    topic: String,
    tokens: TokenSource,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: [PubsubMessage<'a>; 1],
}

#[derive(Serialize)]
struct PubsubMessage<'a> {
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

impl PubSubPublisher {
    pub fn new(
        client: Client,
        endpoint: &str,
        project_id: &str,
        topic_id: &str,
        tokens: TokenSource,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            topic: format!("projects/{project_id}/topics/{topic_id}"),
            tokens,
        }
    }

    /// Fully qualified topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Fail unless the topic exists.
    pub async fn verify_topic(&self) -> Result<(), EnqueueError> {
        let request = self
            .client
            .get(format!("{}/v1/{}", self.endpoint, self.topic));
        let response = self.tokens.authorize(request).await?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EnqueueError::MissingDestination(self.topic.clone()));
        }
        check_status(response).await?;

        info!(topic = %self.topic, "pubsub_topic_verified");
        Ok(())
    }
}

#[async_trait]
impl Enqueuer for PubSubPublisher {
    async fn enqueue(&self, payload: &[u8]) -> Result<String, EnqueueError> {
        let data = STANDARD.encode(payload);
        let body = PublishRequest {
            messages: [PubsubMessage { data: &data }],
        };

        let request = self
            .client
            .post(format!("{}/v1/{}:publish", self.endpoint, self.topic))
            .json(&body);
        let response = self.tokens.authorize(request).await?.send().await?;
        let response: PublishResponse = check_status(response).await?.json().await?;

        response
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| EnqueueError::MalformedResponse("no message id returned".to_string()))
    }
}
