//! Waqu - webhook relay for WhatsApp Cloud API notifications.
//!
//! Accepts authenticated webhook deliveries on `POST /waqu` and hands the raw
//! body to a durable queue before acknowledging.
//!
//! ## Architecture
//!
//! ```text
//! Webhook sender → Web Server → Relay (auth, filter) → Enqueuer → Pub/Sub | Cloud Tasks | RabbitMQ
//! ```

pub mod config;
pub mod notification;
pub mod queue;
pub mod relay;
pub mod web;

// Re-export commonly used types
pub use config::{BackendConfig, Config, ConfigError};
pub use notification::{is_message_event, WebhookNotification};
pub use queue::{EnqueueError, Enqueuer};
pub use relay::{Outcome, Relay};
pub use web::AppState;
