//! Webhook endpoint handlers.
//!
//! The handler only adapts axum's extractors to [`Relay::handle`]; all decisions
//! about status codes live in the relay.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::HeaderMap,
    routing::post,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::relay::{Outcome, Relay};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }
}

/// Build the router serving `POST /waqu`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/waqu", post(waqu_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// WhatsApp webhook endpoint.
///
/// The body is taken unbuffered so it is only read after authentication.
pub async fn waqu_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Outcome {
    state.relay.handle(&headers, body).await
}
