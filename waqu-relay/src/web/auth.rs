//! Bearer token authentication for inbound webhooks.

use axum::http::{header::AUTHORIZATION, HeaderMap};

/// Check the `Authorization` header against the configured shared secret.
///
/// A single leading `Bearer ` is stripped. Without the prefix the raw header
/// value is compared, which fails for any real token. A missing, empty or
/// non-UTF-8 header never authenticates.
pub fn authenticate(headers: &HeaderMap, expected_token: &str) -> bool {
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let token = provided.strip_prefix("Bearer ").unwrap_or(provided);

    if token.is_empty() || expected_token.is_empty() {
        return false;
    }

    constant_time_compare(token, expected_token)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
