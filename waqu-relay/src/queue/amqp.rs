//! RabbitMQ publisher for relayed payloads.
//!
//! The channel runs in publisher-confirm mode, so `enqueue` only returns once the
//! broker has taken the persistent message into the durable queue.

use std::sync::Arc;

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{EnqueueError, Enqueuer};

/// Async RabbitMQ publisher with connection management.
///
/// The publisher maintains a persistent connection and channel to RabbitMQ,
/// reconnecting lazily when the channel is no longer usable.
#[derive(Clone)]
pub struct AmqpPublisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    queue: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl AmqpPublisher {
    /// Create a publisher without connecting.
    pub fn new(url: String, queue: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                queue,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Create a publisher and establish the connection up front.
    pub async fn connect(url: String, queue: String) -> Result<Self, EnqueueError> {
        let publisher = Self::new(url, queue);
        publisher.ensure_connected().await?;
        Ok(publisher)
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel, EnqueueError> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("amqp_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default()).await?;
        let ch = conn.create_channel().await?;
        ch.confirm_select(ConfirmSelectOptions::default()).await?;

        // Idempotent
        ch.queue_declare(
            &self.inner.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

        info!(queue = %self.inner.queue, "amqp_queue_declared");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }
}

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Random 128-bit message id, hex encoded.
fn new_message_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[async_trait]
impl Enqueuer for AmqpPublisher {
    async fn enqueue(&self, payload: &[u8]) -> Result<String, EnqueueError> {
        let channel = self.ensure_connected().await?;
        let message_id = new_message_id();

        let confirmation = channel
            .basic_publish(
                "",
                &self.inner.queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_message_id(message_id.clone().into()),
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(EnqueueError::Nacked(message_id));
        }

        Ok(message_id)
    }

    /// Drop the cached channel and connection, closing each with a normal reply.
    async fn close(&self) {
        let channel = self.inner.channel.write().await.take();
        let connection = self.inner.connection.write().await.take();

        if let Some(channel) = channel {
            if let Err(e) = channel.close(REPLY_SUCCESS, "relay stopping").await {
                warn!(queue = %self.inner.queue, reason = %e, "amqp_channel_close_failed");
            }
        }

        if let Some(connection) = connection {
            if let Err(e) = connection.close(REPLY_SUCCESS, "relay stopping").await {
                warn!(reason = %e, "amqp_connection_close_failed");
            }
        }

        info!(queue = %self.inner.queue, "amqp_publisher_closed");
    }
}
