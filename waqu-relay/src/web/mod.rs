//! Web server module for handling inbound webhooks.
//!
//! A single route, `POST /waqu`, authenticates the sender, optionally drops
//! notifications that carry no user message, and enqueues the raw body before
//! answering.

pub mod auth;
pub mod handlers;

pub use auth::authenticate;
pub use handlers::{router, waqu_webhook, AppState};
