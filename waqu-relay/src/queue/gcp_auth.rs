//! OAuth access tokens for Google Cloud REST APIs.
//!
//! On Cloud Run and GCE the metadata server hands out short-lived tokens for the
//! attached service account. Tokens are cached and refreshed shortly before they
//! expire; concurrent requests share a single refresh.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use super::EnqueueError;

/// Metadata server endpoint for the default service account token.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-account/default/token";

/// Refresh tokens this long before their reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where access tokens come from.
pub enum TokenSource {
    /// No credentials, e.g. the Pub/Sub emulator.
    Anonymous,
    /// A fixed token supplied through configuration.
    Static(String),
    /// Tokens fetched from the instance metadata server.
    Metadata(MetadataTokens),
}

impl TokenSource {
    /// Pick a token source: a configured token wins, otherwise the metadata server.
    pub fn new(client: Client, access_token: Option<String>) -> Self {
        match access_token {
            Some(token) => TokenSource::Static(token),
            None => TokenSource::Metadata(MetadataTokens::new(client, METADATA_TOKEN_URL)),
        }
    }

    /// Current access token, if this source uses one.
    pub async fn token(&self) -> Result<Option<String>, EnqueueError> {
        match self {
            TokenSource::Anonymous => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::Metadata(metadata) => metadata.token().await.map(Some),
        }
    }

    /// Attach the bearer token to an outgoing API request.
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, EnqueueError> {
        Ok(match self.token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

/// Cached tokens from the metadata server.
pub struct MetadataTokens {
    client: Client,
    url: String,
    cached: RwLock<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl MetadataTokens {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            cached: RwLock::new(None),
        }
    }

    /// Return a valid token, fetching a new one if the cached one is stale.
    pub async fn token(&self) -> Result<String, EnqueueError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if Instant::now() < token.refresh_at {
                    return Ok(token.value.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| EnqueueError::Auth(format!("metadata server unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(EnqueueError::Auth(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| EnqueueError::Auth(format!("invalid token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in);
        let refresh_at = Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN);

        info!(expires_in = token.expires_in, "gcp_access_token_refreshed");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });

        Ok(token.access_token)
    }
}
