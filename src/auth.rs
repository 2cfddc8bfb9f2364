//! Caller identity plumbing.
//!
//! Authentication and payment settlement happen upstream of this service;
//! by the time a request reaches a handler the fronting layer has resolved
//! the tenant address and forwarded it in the `x-caller` header. The
//! gateway trusts that header and uses it for ownership checks only.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::GatewayError;

pub const CALLER_HEADER: &str = "x-caller";

/// Tenant address attached to the current request.
#[derive(Clone, Debug)]
pub struct Caller(pub String);

impl Caller {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(value.to_string()))
            .ok_or(GatewayError::Forbidden)
    }
}
