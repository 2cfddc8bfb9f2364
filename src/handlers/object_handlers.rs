//! HTTP handlers for object operations.
//! Bodies stream through in both directions (the gateway never buffers an
//! object in memory) and all admission logic lives in the `Gateway`
//! service.

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use uuid::Uuid;

use crate::{
    auth::Caller,
    errors::GatewayError,
    services::gateway::{Gateway, ObjectPage, PutObjectOutcome},
};

#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// PUT `/buckets/{id}/objects/{*key}` — upload an object.
///
/// `Content-Type` is forwarded to the backend; `Content-Length`, when
/// present, is what quota admission and overwrite accounting run on.
pub async fn upload_object(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path((id, key)): Path<(Uuid, String)>,
    headers: axum::http::HeaderMap,
    body: Body,
) -> Result<Json<PutObjectOutcome>, GatewayError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));

    let outcome = gateway
        .put_object(&caller, id, &key, content_type, declared_len, stream)
        .await?;
    Ok(Json(outcome))
}

/// GET `/buckets/{id}/objects/{*key}` — download an object as a streaming
/// response.
pub async fn get_object(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path((id, key)): Path<(Uuid, String)>,
) -> Result<Response, GatewayError> {
    let download = gateway.get_object(&caller, id, &key).await?;

    let content_type = download
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    let content_length = download.content_length;
    let etag = download.etag.clone();
    let last_modified = download.last_modified;

    let mut response = Response::new(Body::from_stream(download.into_stream()));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(length) = content_length {
        if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
            headers.insert(header::CONTENT_LENGTH, value);
        }
    }
    if let Some(etag) = etag {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }
    if let Some(modified) = last_modified {
        if let Ok(value) = HeaderValue::from_str(&modified.to_rfc2822()) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }

    Ok(response)
}

/// DELETE `/buckets/{id}/objects/{*key}` — delete an object.
pub async fn delete_object(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path((id, key)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    gateway.delete_object(&caller, id, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/buckets/{id}/objects` — list objects, supports ?prefix=&limit=&cursor=
pub async fn list_objects(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Json<ObjectPage>, GatewayError> {
    let page = gateway
        .list_objects(&caller, id, q.prefix, q.limit, q.cursor)
        .await?;
    Ok(Json(page))
}
