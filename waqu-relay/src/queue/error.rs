//! Errors returned by queue backends.

use thiserror::Error;

/// Why a payload could not be handed to the queue backend.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The backend could not be reached or the connection broke mid-call.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The backend answered 2xx but the response carried no usable identifier.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// No access token could be obtained for the backend API.
    #[error("authentication with backend failed: {0}")]
    Auth(String),

    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The broker refused responsibility for a published message.
    #[error("broker nacked message {0}")]
    Nacked(String),

    /// The configured destination does not exist.
    #[error("destination {0} does not exist")]
    MissingDestination(String),
}
