//! Translates remote-backend failures into the domain taxonomy.
//!
//! Control-plane failures carry their meaning in the HTTP status line;
//! data-plane failures arrive as a structured XML body with a code and a
//! message. Both collapse onto the same closed set of domain errors.
//! Anything unrecognized, including an envelope that does not parse, is a
//! backend error.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::errors::GatewayError;

/// Structured error body returned by the object data plane.
#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
struct RemoteErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Map a bucket-control-plane failure (plain HTTP envelope).
pub fn map_control_plane(status: StatusCode, body: &str) -> GatewayError {
    match status.as_u16() {
        404 => GatewayError::NotFound,
        401 | 403 => GatewayError::Forbidden,
        400 | 422 => GatewayError::InvalidRequest(control_plane_message(body)),
        409 => GatewayError::BucketNameTaken,
        429 => GatewayError::RateLimited,
        _ => GatewayError::Backend(format!("bucket api returned {}: {}", status, snippet(body))),
    }
}

/// Map an object-data-plane failure (XML code + message body).
pub fn map_data_plane(status: StatusCode, body: &str) -> GatewayError {
    match quick_xml::de::from_str::<RemoteErrorBody>(body) {
        Ok(err) => map_remote_code(&err.code, &err.message),
        Err(_) => GatewayError::Backend(format!(
            "object api returned {} with unrecognized body: {}",
            status,
            snippet(body)
        )),
    }
}

fn map_remote_code(code: &str, message: &str) -> GatewayError {
    match code {
        "NoSuchKey" | "NoSuchBucket" | "NotFound" => GatewayError::NotFound,
        "AccessDenied" => GatewayError::Forbidden,
        "InvalidRequest" | "InvalidArgument" | "MalformedXML" => {
            let message = if message.is_empty() {
                "invalid request".to_string()
            } else {
                message.to_string()
            };
            GatewayError::InvalidRequest(message)
        }
        "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" => GatewayError::BucketNameTaken,
        "SlowDown" | "TooManyRequests" => GatewayError::RateLimited,
        _ => GatewayError::Backend(format!("{}: {}", code, message)),
    }
}

/// Pull a human-readable message out of a control-plane JSON error body.
fn control_plane_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "invalid request".to_string())
}

fn snippet(body: &str) -> String {
    body.trim().chars().take(200).collect()
}
