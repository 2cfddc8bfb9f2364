//! Domain error taxonomy shared across the gateway.
//!
//! Every failure a tenant can observe is one of the variants below.
//! Remote-backend failures are translated into this set at the client
//! boundary (see `remote::error`); validation and ownership failures are
//! produced locally before any remote call is attempted.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bucket or object not found")]
    NotFound,

    #[error("caller is not allowed to access this resource")]
    Forbidden,

    #[error("{0}")]
    InvalidRequest(String),

    /// A write against a finite quota arrived without a declared length.
    #[error("content length required for quota enforcement")]
    LengthRequired,

    #[error("bucket name is already taken")]
    BucketNameTaken,

    #[error("bucket limit for this tenant reached")]
    BucketLimitExceeded,

    #[error("bucket quota exceeded")]
    QuotaExceeded,

    #[error("tenant storage limit exceeded")]
    StorageLimitExceeded,

    #[error("backend rate limited the request")]
    RateLimited,

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Stable machine-readable code surfaced in the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotFound => "not_found",
            GatewayError::Forbidden => "forbidden",
            GatewayError::InvalidRequest(_) | GatewayError::LengthRequired => "invalid_request",
            GatewayError::BucketNameTaken => "bucket_name_taken",
            GatewayError::BucketLimitExceeded => "bucket_limit_exceeded",
            GatewayError::QuotaExceeded => "quota_exceeded",
            GatewayError::StorageLimitExceeded => "storage_limit_exceeded",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::Backend(_) => "backend_error",
            GatewayError::Database(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::LengthRequired => StatusCode::LENGTH_REQUIRED,
            GatewayError::BucketNameTaken | GatewayError::BucketLimitExceeded => {
                StatusCode::CONFLICT
            }
            GatewayError::QuotaExceeded | GatewayError::StorageLimitExceeded => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Backend(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // Database details stay in the logs, not in tenant responses.
        let message = match &self {
            GatewayError::Database(err) => {
                tracing::error!("database error: {err}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let status = self.status();
        let body = Json(json!({
            "error": self.code(),
            "message": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Transport-level failures (connect errors, timeouts) are backend errors:
/// the gateway never retries them itself.
impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Backend(err.to_string())
    }
}
