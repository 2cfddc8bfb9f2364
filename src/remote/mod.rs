//! Thin transports to the remote backend.
//!
//! The backend exposes two planes: a JSON bucket-management API (the
//! control plane) and an S3-style object API (the data plane). Both are
//! issued with a bounded timeout and never retried here; retries, if any,
//! belong to the caller's transport layer. Failures cross into the domain
//! taxonomy through `error::` before they reach a handler.

pub mod buckets;
pub mod error;
pub mod objects;

use std::time::Duration;

use anyhow::Result;

/// Build the shared HTTP client used by both planes.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(Into::into)
}

/// Attach the backend bearer token when one is configured.
fn authorize(req: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
    if token.is_empty() {
        req
    } else {
        req.bearer_auth(token)
    }
}
