//! Remote Object Client — the backend's S3-style object API.
//!
//! HEAD/PUT/GET/DELETE/LIST against the data plane. Listing responses come
//! back as a `ListBucketResult` XML document and are parsed with serde
//! structs rather than string matching; error responses carry a structured
//! `<Error>` body and go through `error::map_data_plane`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, TryStream};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use tracing::debug;

use crate::errors::{GatewayError, GatewayResult};
use crate::models::object::{ObjectRecord, ObjectStat};
use crate::remote::{authorize, error::map_data_plane};

/// Everything except unreserved characters and the key's own `/` separators
/// gets percent-encoded on the way into a URL.
const KEY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Outcome of a data-plane PUT. The backend reports only a checksum; size
/// is whatever the caller declared.
#[derive(Debug)]
pub struct PutResult {
    pub etag: Option<String>,
}

/// One page of a remote listing.
#[derive(Debug)]
pub struct ListPage {
    pub objects: Vec<ObjectRecord>,
    pub is_truncated: bool,
    pub next_token: Option<String>,
}

/// A streaming download handle. Metadata is read from the response headers
/// up front; the body is consumed via `into_stream`.
#[derive(Debug)]
pub struct ObjectDownload {
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    response: reqwest::Response,
}

impl ObjectDownload {
    pub fn into_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> {
        self.response.bytes_stream()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
struct ListBucketResultXml {
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "NextContinuationToken")]
    next_continuation_token: Option<String>,
    #[serde(rename = "Contents", default)]
    contents: Vec<ObjectContentXml>,
}

#[derive(Debug, Deserialize)]
struct ObjectContentXml {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "LastModified")]
    last_modified: Option<String>,
    #[serde(rename = "ETag")]
    etag: Option<String>,
    #[serde(rename = "Size")]
    size: i64,
}

#[derive(Clone)]
pub struct RemoteObjectClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl RemoteObjectClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{}", self.endpoint, bucket)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            bucket,
            utf8_percent_encode(key, KEY_ENCODE)
        )
    }

    /// HEAD an object. `Ok(None)` means the key does not exist; any other
    /// failure is a mapped error (HEAD responses carry no error body, so
    /// non-404 failures surface as backend errors).
    pub async fn head_object(&self, bucket: &str, key: &str) -> GatewayResult<Option<ObjectStat>> {
        let req = self.http.head(self.object_url(bucket, key));
        let resp = authorize(req, &self.token).send().await?;
        let status = resp.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(GatewayError::Backend(format!(
                "object api HEAD returned {}",
                status
            )));
        }

        let size = header_str(&resp, reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let etag = header_str(&resp, reqwest::header::ETAG).map(unquote_etag);
        let content_type = header_str(&resp, reqwest::header::CONTENT_TYPE);
        Ok(Some(ObjectStat {
            size,
            etag,
            content_type,
        }))
    }

    pub async fn put_object<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: S,
    ) -> GatewayResult<PutResult>
    where
        S: TryStream + Send + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        let mut req = self
            .http
            .put(self.object_url(bucket, key))
            .body(reqwest::Body::wrap_stream(body));
        if let Some(ct) = content_type {
            req = req.header(reqwest::header::CONTENT_TYPE, ct);
        }

        let resp = authorize(req, &self.token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(map_data_plane(status, &resp.text().await.unwrap_or_default()));
        }

        let etag = header_str(&resp, reqwest::header::ETAG).map(unquote_etag);
        debug!("stored {}/{}", bucket, key);
        Ok(PutResult { etag })
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> GatewayResult<ObjectDownload> {
        let req = self.http.get(self.object_url(bucket, key));
        let resp = authorize(req, &self.token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(map_data_plane(status, &resp.text().await.unwrap_or_default()));
        }

        Ok(ObjectDownload {
            content_type: header_str(&resp, reqwest::header::CONTENT_TYPE),
            content_length: header_str(&resp, reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.parse::<i64>().ok()),
            etag: header_str(&resp, reqwest::header::ETAG).map(unquote_etag),
            last_modified: header_str(&resp, reqwest::header::LAST_MODIFIED)
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            response: resp,
        })
    }

    /// Delete an object. A missing key is not an error; deletion is
    /// idempotent from the gateway's point of view.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        let req = self.http.delete(self.object_url(bucket, key));
        let resp = authorize(req, &self.token).send().await?;
        let status = resp.status();
        if status.is_success() || status.as_u16() == 404 {
            debug!("deleted {}/{}", bucket, key);
            return Ok(());
        }
        match map_data_plane(status, &resp.text().await.unwrap_or_default()) {
            GatewayError::NotFound => Ok(()),
            other => Err(other),
        }
    }

    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: usize,
        continuation_token: Option<&str>,
    ) -> GatewayResult<ListPage> {
        let mut query: Vec<(&str, String)> =
            vec![("list-type", "2".into()), ("max-keys", max_keys.to_string())];
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix.to_string()));
        }
        if let Some(token) = continuation_token {
            query.push(("continuation-token", token.to_string()));
        }

        let req = self.http.get(self.bucket_url(bucket)).query(&query);
        let resp = authorize(req, &self.token).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(map_data_plane(status, &body));
        }

        parse_list_payload(&body)
    }
}

/// Parse a `ListBucketResult` document into a page of object records.
fn parse_list_payload(payload: &str) -> GatewayResult<ListPage> {
    let parsed: ListBucketResultXml = quick_xml::de::from_str(payload).map_err(|err| {
        GatewayError::Backend(format!("object api returned unparseable listing: {}", err))
    })?;

    let objects = parsed
        .contents
        .into_iter()
        .map(|entry| ObjectRecord {
            key: entry.key,
            size: entry.size,
            etag: entry.etag.map(unquote_etag),
            last_modified: entry
                .last_modified
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
        .collect();

    Ok(ListPage {
        objects,
        is_truncated: parsed.is_truncated,
        next_token: parsed.next_continuation_token,
    })
}

fn header_str(resp: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn unquote_etag(value: String) -> String {
    value.trim_matches('"').to_string()
}
