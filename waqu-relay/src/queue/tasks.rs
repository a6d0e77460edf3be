//! Google Cloud Tasks HTTP task dispatcher.
//!
//! Each payload becomes an HTTP task that Cloud Tasks later POSTs to a fixed
//! downstream URL with a fixed bearer credential. Cloud Tasks owns retries of
//! that downstream call once the task is created.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use super::{check_status, EnqueueError, Enqueuer, TokenSource};

/// Creates one Cloud Tasks HTTP task per payload.
pub struct TaskDispatcher {
    client: Client,
    endpoint: String,
    /// `projects/{project}/locations/{location}/queues/{queue}`
    queue: String,
    target_url: Url,
    target_token: String,
    tokens: TokenSource,
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    task: Task<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Task<'a> {
    http_request: HttpRequest<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequest<'a> {
    url: &'a str,
    http_method: &'static str,
    headers: BTreeMap<&'static str, String>,
    body: String,
}

#[derive(Deserialize)]
struct CreatedTask {
    #[serde(default)]
    name: String,
}

impl TaskDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        endpoint: &str,
        project_id: &str,
        location_id: &str,
        queue_id: &str,
        target_url: Url,
        target_token: String,
        tokens: TokenSource,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            queue: format!("projects/{project_id}/locations/{location_id}/queues/{queue_id}"),
            target_url,
            target_token,
            tokens,
        }
    }

    /// Fully qualified queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Fail unless the queue exists.
    pub async fn verify_queue(&self) -> Result<(), EnqueueError> {
        let request = self
            .client
            .get(format!("{}/v2/{}", self.endpoint, self.queue));
        let response = self.tokens.authorize(request).await?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EnqueueError::MissingDestination(self.queue.clone()));
        }
        check_status(response).await?;

        info!(queue = %self.queue, target_url = %self.target_url, "cloud_tasks_queue_verified");
        Ok(())
    }

    fn task_request(&self, payload: &[u8]) -> CreateTaskRequest<'_> {
        let headers = BTreeMap::from([
            ("Authorization", format!("Bearer {}", self.target_token)),
            ("Content-Type", "application/json".to_string()),
        ]);

        CreateTaskRequest {
            task: Task {
                http_request: HttpRequest {
                    url: self.target_url.as_str(),
                    http_method: "POST",
                    headers,
                    body: STANDARD.encode(payload),
                },
            },
        }
    }
}

/// Last path segment of a task name, e.g. the `123` in `.../tasks/123`.
pub fn short_task_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[async_trait]
impl Enqueuer for TaskDispatcher {
    async fn enqueue(&self, payload: &[u8]) -> Result<String, EnqueueError> {
        let request = self
            .client
            .post(format!("{}/v2/{}/tasks", self.endpoint, self.queue))
            .json(&self.task_request(payload));
        let response = self.tokens.authorize(request).await?.send().await?;
        let task: CreatedTask = check_status(response).await?.json().await?;

        match short_task_id(&task.name) {
            "" => Err(EnqueueError::MalformedResponse(
                "task name missing from response".to_string(),
            )),
            id => Ok(id.to_string()),
        }
    }
}
