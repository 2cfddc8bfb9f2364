//! Object Gateway — the request-facing core.
//!
//! Validates names and keys, resolves ownership, enforces quota and the
//! per-tenant storage cap at admission time, performs overwrite-size
//! accounting, and drives the remote clients. Handlers stay thin; all
//! sequencing lives here.

use std::io;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::auth::Caller;
use crate::errors::{GatewayError, GatewayResult};
use crate::models::bucket::Bucket;
use crate::models::object::ObjectRecord;
use crate::remote::buckets::RemoteBucketClient;
use crate::remote::objects::{ObjectDownload, RemoteObjectClient};
use crate::services::quota::{QuotaLedger, QuotaStatus};
use crate::services::reconcile::{ReconcileOutcome, UsageReconciler};
use crate::services::registry::BucketRegistry;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Default and maximum page sizes for object listings.
pub const LIST_DEFAULT_PAGE: usize = 100;
pub const LIST_MAX_PAGE: usize = 1000;

/// Result of a successful upload.
#[derive(Debug, Serialize)]
pub struct PutObjectOutcome {
    pub key: String,
    pub size: i64,
    pub etag: Option<String>,
}

/// One tenant-facing page of an object listing.
#[derive(Debug, Serialize)]
pub struct ObjectPage {
    pub objects: Vec<ObjectRecord>,
    pub is_truncated: bool,
    pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct Gateway {
    /// Shared SQLite pool, also used by the readiness probe.
    pub db: Arc<SqlitePool>,
    pub registry: BucketRegistry,
    pub ledger: QuotaLedger,
    pub reconciler: UsageReconciler,
    buckets: RemoteBucketClient,
    objects: RemoteObjectClient,
    tenant_storage_limit_bytes: i64,
}

impl Gateway {
    pub fn new(
        db: Arc<SqlitePool>,
        buckets: RemoteBucketClient,
        objects: RemoteObjectClient,
        max_buckets_per_owner: u32,
        tenant_storage_limit_bytes: i64,
    ) -> Self {
        let registry = BucketRegistry::new(db.clone(), max_buckets_per_owner);
        let ledger = QuotaLedger::new(db.clone());
        let reconciler = UsageReconciler::new(ledger.clone(), objects.clone());
        Self {
            db,
            registry,
            ledger,
            reconciler,
            buckets,
            objects,
            tenant_storage_limit_bytes,
        }
    }

    /// Fetch a bucket and verify the caller owns it: 404 for unknown ids,
    /// 403 for somebody else's bucket.
    async fn resolve_owned(&self, id: Uuid, caller: &Caller) -> GatewayResult<Bucket> {
        let bucket = self.registry.get(id).await?;
        if bucket.owner != caller.as_str() {
            return Err(GatewayError::Forbidden);
        }
        Ok(bucket)
    }

    // --- bucket lifecycle -------------------------------------------------

    /// Create a bucket: local admission checks first, then the row (which
    /// reserves `(owner, name)` against concurrent creates), then the
    /// backend bucket. A failed backend create rolls the row back.
    pub async fn create_bucket(
        &self,
        caller: &Caller,
        name: &str,
        location: Option<String>,
    ) -> GatewayResult<Bucket> {
        validate_bucket_name(name)?;
        self.registry.ensure_can_create(caller.as_str(), name).await?;

        let bucket = self.registry.create(name, caller.as_str(), location).await?;
        if let Err(err) = self.buckets.create_bucket(&bucket.backend_name).await {
            if let Err(cleanup) = self.registry.delete(bucket.id).await {
                warn!(
                    "could not roll back bucket row {} after backend create failure: {}",
                    bucket.id, cleanup
                );
            }
            return Err(err);
        }
        Ok(bucket)
    }

    pub async fn get_bucket(&self, caller: &Caller, id: Uuid) -> GatewayResult<Bucket> {
        self.resolve_owned(id, caller).await
    }

    pub async fn list_buckets(
        &self,
        caller: &Caller,
        limit: i64,
        offset: i64,
    ) -> GatewayResult<(Vec<Bucket>, i64)> {
        let buckets = self
            .registry
            .list_by_owner(caller.as_str(), limit, offset)
            .await?;
        let total = self.registry.count_by_owner(caller.as_str()).await?;
        Ok((buckets, total))
    }

    /// Delete a bucket and its remote backing store. A backend bucket that
    /// is already gone does not block removal of the local record.
    pub async fn delete_bucket(&self, caller: &Caller, id: Uuid) -> GatewayResult<()> {
        let bucket = self.resolve_owned(id, caller).await?;

        match self.buckets.get_bucket(&bucket.backend_name).await {
            Ok(_) => self.buckets.delete_bucket(&bucket.backend_name).await?,
            Err(GatewayError::NotFound) => {
                warn!(
                    "backend bucket {} already absent; removing local record",
                    bucket.backend_name
                );
            }
            Err(other) => return Err(other),
        }

        self.registry.delete(bucket.id).await
    }

    // --- objects ----------------------------------------------------------

    /// Upload an object.
    ///
    /// Admission order: ownership, key validation, length-required for
    /// finite quotas, best-effort HEAD for the overwrite delta, per-bucket
    /// quota, per-tenant cap, then the remote write. The admission check
    /// reads the cached counter, so a concurrent writer on the same bucket
    /// can slip through the window and transiently overshoot the quota; the
    /// counter update itself is atomic and reconciliation restores truth.
    pub async fn put_object<S>(
        &self,
        caller: &Caller,
        id: Uuid,
        key: &str,
        content_type: Option<String>,
        declared_len: Option<i64>,
        body: S,
    ) -> GatewayResult<PutObjectOutcome>
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
    {
        let bucket = self.resolve_owned(id, caller).await?;
        validate_object_key(key)?;

        if let Some(declared) = declared_len {
            if declared < 0 {
                return Err(GatewayError::InvalidRequest(
                    "content length must be non-negative".into(),
                ));
            }
        }
        // An unbounded stream cannot be admitted against a finite quota.
        if bucket.quota_bytes.is_some() && declared_len.is_none() {
            return Err(GatewayError::LengthRequired);
        }

        // A failed HEAD means we treat the key as new rather than fail the
        // whole upload.
        let old_size = self
            .objects
            .head_object(&bucket.backend_name, key)
            .await
            .ok()
            .flatten()
            .map(|stat| stat.size)
            .unwrap_or(0);

        let incoming = declared_len.unwrap_or(0);
        let net_delta = incoming - old_size;

        if let Some(quota) = bucket.quota_bytes {
            if quota == 0 || bucket.usage_bytes + net_delta > quota {
                return Err(GatewayError::QuotaExceeded);
            }
        }

        if incoming > 0 {
            let total = self.ledger.total_usage_by_owner(&bucket.owner).await?;
            if total + net_delta > self.tenant_storage_limit_bytes {
                return Err(GatewayError::StorageLimitExceeded);
            }
        }

        let put = self
            .objects
            .put_object(&bucket.backend_name, key, content_type.as_deref(), body)
            .await?;

        // Only declared-length writes feed the counter; untracked uploads
        // leave drift for reconciliation to collect.
        if declared_len.is_some() && net_delta != 0 {
            let applied = if net_delta > 0 {
                self.ledger.increment_usage(bucket.id, net_delta).await
            } else {
                self.ledger.decrement_usage(bucket.id, -net_delta).await
            };
            if let Err(err) = applied {
                warn!(
                    "usage counter for bucket {} not updated after write of {} ({}); \
                     drift persists until reconciliation",
                    bucket.id, key, err
                );
            }
        }

        let (size, fallback_etag) = match declared_len {
            Some(declared) => (declared, None),
            // The data-plane PUT response reports no size; ask the backend.
            None => match self.objects.head_object(&bucket.backend_name, key).await {
                Ok(Some(stat)) => (stat.size, stat.etag),
                _ => (0, None),
            },
        };

        Ok(PutObjectOutcome {
            key: key.to_string(),
            size,
            etag: put.etag.or(fallback_etag),
        })
    }

    /// Stream an object back. Reads never touch the usage counter.
    pub async fn get_object(
        &self,
        caller: &Caller,
        id: Uuid,
        key: &str,
    ) -> GatewayResult<ObjectDownload> {
        let bucket = self.resolve_owned(id, caller).await?;
        validate_object_key(key)?;
        self.objects.get_object(&bucket.backend_name, key).await
    }

    /// Delete an object and release its bytes from the ledger. If the HEAD
    /// fails the object may already be gone; the delete still runs and the
    /// counter is left alone.
    pub async fn delete_object(&self, caller: &Caller, id: Uuid, key: &str) -> GatewayResult<()> {
        let bucket = self.resolve_owned(id, caller).await?;
        validate_object_key(key)?;

        let old_size = self
            .objects
            .head_object(&bucket.backend_name, key)
            .await
            .ok()
            .flatten()
            .map(|stat| stat.size)
            .unwrap_or(0);

        self.objects.delete_object(&bucket.backend_name, key).await?;

        if old_size > 0 {
            if let Err(err) = self.ledger.decrement_usage(bucket.id, old_size).await {
                warn!(
                    "usage counter for bucket {} not decremented after delete of {} ({}); \
                     drift persists until reconciliation",
                    bucket.id, key, err
                );
            }
        }
        Ok(())
    }

    pub async fn list_objects(
        &self,
        caller: &Caller,
        id: Uuid,
        prefix: Option<String>,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> GatewayResult<ObjectPage> {
        let bucket = self.resolve_owned(id, caller).await?;
        let limit = limit.unwrap_or(LIST_DEFAULT_PAGE).clamp(1, LIST_MAX_PAGE);
        let token = cursor.as_deref().map(decode_cursor);

        let page = self
            .objects
            .list_objects(&bucket.backend_name, prefix.as_deref(), limit, token.as_deref())
            .await?;

        Ok(ObjectPage {
            objects: page.objects,
            is_truncated: page.is_truncated,
            next_cursor: page.next_token.as_deref().map(encode_cursor),
        })
    }

    // --- quota ------------------------------------------------------------

    pub async fn get_quota(&self, caller: &Caller, id: Uuid) -> GatewayResult<QuotaStatus> {
        let bucket = self.resolve_owned(id, caller).await?;
        self.ledger.get_quota(bucket.id).await
    }

    pub async fn set_quota(
        &self,
        caller: &Caller,
        id: Uuid,
        quota_bytes: Option<i64>,
    ) -> GatewayResult<QuotaStatus> {
        let bucket = self.resolve_owned(id, caller).await?;
        self.ledger.set_quota(bucket.id, quota_bytes).await?;
        self.ledger.get_quota(bucket.id).await
    }

    pub async fn reconcile(&self, caller: &Caller, id: Uuid) -> GatewayResult<ReconcileOutcome> {
        let bucket = self.resolve_owned(id, caller).await?;
        self.reconciler.reconcile(&bucket).await
    }

    /// Readiness probe for the control plane.
    pub async fn backend_ready(&self) -> GatewayResult<()> {
        self.buckets.list_buckets().await.map(|_| ())
    }
}

// --- validation -----------------------------------------------------------

/// Object keys: 1–1024 bytes, no NUL, no leading slash.
fn validate_object_key(key: &str) -> GatewayResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(GatewayError::InvalidRequest(
            "object key must be between 1 and 1024 bytes".into(),
        ));
    }
    if key.bytes().any(|b| b == 0) {
        return Err(GatewayError::InvalidRequest(
            "object key must not contain null bytes".into(),
        ));
    }
    if key.starts_with('/') {
        return Err(GatewayError::InvalidRequest(
            "object key must not start with a slash".into(),
        ));
    }
    Ok(())
}

/// Bucket names: 3–63 chars of lowercase letters, digits, and hyphens;
/// alphanumeric first and last character; no consecutive hyphens.
fn validate_bucket_name(name: &str) -> GatewayResult<()> {
    let len = name.len();
    if len < BUCKET_NAME_MIN_LEN || len > BUCKET_NAME_MAX_LEN {
        return Err(GatewayError::InvalidRequest(
            "bucket name must be between 3 and 63 characters".into(),
        ));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err(GatewayError::InvalidRequest(
            "bucket name may only contain lowercase letters, digits, and hyphens".into(),
        ));
    }
    let bytes = name.as_bytes();
    if bytes[0] == b'-' || bytes[len - 1] == b'-' {
        return Err(GatewayError::InvalidRequest(
            "bucket name must start and end with a letter or digit".into(),
        ));
    }
    if name.contains("--") {
        return Err(GatewayError::InvalidRequest(
            "bucket name must not contain consecutive hyphens".into(),
        ));
    }
    Ok(())
}

/// Tenant-facing cursors wrap the backend continuation token in base64 so
/// the token stays opaque end to end.
fn encode_cursor(token: &str) -> String {
    general_purpose::STANDARD.encode(token)
}

fn decode_cursor(cursor: &str) -> String {
    general_purpose::STANDARD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| cursor.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote;
    use crate::services::registry::tests::test_pool;
    use axum::{
        Json, Router,
        body::Body,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
        routing::{get, post},
    };
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    // ---- key/name validation boundaries ----

    #[test]
    fn bucket_name_boundaries() {
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("ab1").is_ok());
        assert!(validate_bucket_name("my-bucket-01").is_ok());
        assert!(validate_bucket_name("-leading").is_err());
        assert!(validate_bucket_name("trailing-").is_err());
        assert!(validate_bucket_name("two--hyphens").is_err());
        assert!(validate_bucket_name("Uppercase").is_err());
        assert!(validate_bucket_name("dotted.name").is_err());
        assert!(validate_bucket_name(&"a".repeat(63)).is_ok());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn object_key_boundaries() {
        assert!(validate_object_key("a").is_ok());
        assert!(validate_object_key("photos/2025/img.jpg").is_ok());
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("/leading").is_err());
        assert!(validate_object_key("nul\0byte").is_err());
        assert!(validate_object_key(&"k".repeat(1024)).is_ok());
        assert!(validate_object_key(&"k".repeat(1025)).is_err());
    }

    #[test]
    fn cursors_round_trip_and_tolerate_raw_tokens() {
        let encoded = encode_cursor("photos/2025/b.jpg");
        assert_ne!(encoded, "photos/2025/b.jpg");
        assert_eq!(decode_cursor(&encoded), "photos/2025/b.jpg");
        // A token that was never wrapped passes through unchanged.
        assert_eq!(decode_cursor("plain?token"), "plain?token");
    }

    // ---- in-process fake backend ----

    #[derive(Default)]
    struct FakeBackend {
        buckets: HashSet<String>,
        objects: HashMap<String, BTreeMap<String, StoredObject>>,
    }

    #[derive(Clone)]
    struct StoredObject {
        data: Vec<u8>,
        content_type: Option<String>,
    }

    type Shared = Arc<Mutex<FakeBackend>>;

    fn fake_etag(data: &[u8]) -> String {
        let sum: u64 = data.iter().map(|b| *b as u64).sum();
        format!("{:08x}-{:x}", data.len(), sum)
    }

    fn xml_error(status: StatusCode, code: &str) -> Response {
        let body = format!(
            "<Error><Code>{}</Code><Message>{}</Message></Error>",
            code, code
        );
        (
            status,
            [(header::CONTENT_TYPE, "application/xml")],
            body,
        )
            .into_response()
    }

    async fn cp_create(State(state): State<Shared>, Json(body): Json<serde_json::Value>) -> Response {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let mut backend = state.lock().unwrap();
        if backend.buckets.contains(&name) {
            return (StatusCode::CONFLICT, Json(json!({"error": "bucket exists"}))).into_response();
        }
        backend.buckets.insert(name.clone());
        backend.objects.entry(name.clone()).or_default();
        (StatusCode::CREATED, Json(json!({"name": name}))).into_response()
    }

    async fn cp_list(State(state): State<Shared>) -> Response {
        let backend = state.lock().unwrap();
        let buckets: Vec<_> = backend.buckets.iter().map(|n| json!({"name": n})).collect();
        Json(json!({"buckets": buckets})).into_response()
    }

    async fn cp_get(State(state): State<Shared>, Path(name): Path<String>) -> Response {
        if state.lock().unwrap().buckets.contains(&name) {
            Json(json!({"name": name})).into_response()
        } else {
            (StatusCode::NOT_FOUND, Json(json!({"error": "no such bucket"}))).into_response()
        }
    }

    async fn cp_delete(State(state): State<Shared>, Path(name): Path<String>) -> Response {
        let mut backend = state.lock().unwrap();
        if backend.buckets.remove(&name) {
            backend.objects.remove(&name);
            StatusCode::NO_CONTENT.into_response()
        } else {
            (StatusCode::NOT_FOUND, Json(json!({"error": "no such bucket"}))).into_response()
        }
    }

    async fn dp_put(
        State(state): State<Shared>,
        Path((bucket, key)): Path<(String, String)>,
        headers: HeaderMap,
        body: Body,
    ) -> Response {
        let data = axum::body::to_bytes(body, usize::MAX).await.unwrap().to_vec();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut backend = state.lock().unwrap();
        if !backend.buckets.contains(&bucket) {
            return xml_error(StatusCode::NOT_FOUND, "NoSuchBucket");
        }
        let etag = fake_etag(&data);
        backend
            .objects
            .entry(bucket)
            .or_default()
            .insert(key, StoredObject { data, content_type });

        (
            StatusCode::OK,
            [(header::ETAG, format!("\"{}\"", etag))],
        )
            .into_response()
    }

    async fn dp_get(
        State(state): State<Shared>,
        Path((bucket, key)): Path<(String, String)>,
    ) -> Response {
        let backend = state.lock().unwrap();
        if !backend.buckets.contains(&bucket) {
            return xml_error(StatusCode::NOT_FOUND, "NoSuchBucket");
        }
        let Some(stored) = backend.objects.get(&bucket).and_then(|m| m.get(&key)) else {
            return xml_error(StatusCode::NOT_FOUND, "NoSuchKey");
        };

        let mut response = Response::new(Body::from(stored.data.clone()));
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_LENGTH,
            stored.data.len().to_string().parse().unwrap(),
        );
        headers.insert(
            header::ETAG,
            format!("\"{}\"", fake_etag(&stored.data)).parse().unwrap(),
        );
        if let Some(ct) = &stored.content_type {
            if let Ok(value) = ct.parse() {
                headers.insert(header::CONTENT_TYPE, value);
            }
        }
        response
    }

    async fn dp_delete(
        State(state): State<Shared>,
        Path((bucket, key)): Path<(String, String)>,
    ) -> Response {
        let mut backend = state.lock().unwrap();
        let removed = backend
            .objects
            .get_mut(&bucket)
            .and_then(|m| m.remove(&key))
            .is_some();
        if removed {
            StatusCode::NO_CONTENT.into_response()
        } else {
            xml_error(StatusCode::NOT_FOUND, "NoSuchKey")
        }
    }

    async fn dp_list(
        State(state): State<Shared>,
        Path(bucket): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        let backend = state.lock().unwrap();
        if !backend.buckets.contains(&bucket) {
            return xml_error(StatusCode::NOT_FOUND, "NoSuchBucket");
        }
        let prefix = params.get("prefix").cloned().unwrap_or_default();
        let token = params.get("continuation-token").cloned();
        let max_keys: usize = params
            .get("max-keys")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);

        let entries: Vec<(String, usize)> = backend
            .objects
            .get(&bucket)
            .map(|m| {
                m.iter()
                    .filter(|(key, _)| key.starts_with(&prefix))
                    .filter(|(key, _)| token.as_deref().is_none_or(|t| key.as_str() > t))
                    .map(|(key, stored)| (key.clone(), stored.data.len()))
                    .collect()
            })
            .unwrap_or_default();

        let is_truncated = entries.len() > max_keys;
        let page = &entries[..entries.len().min(max_keys)];
        let next_token = if is_truncated {
            page.last().map(|(key, _)| key.clone())
        } else {
            None
        };

        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
        );
        xml.push_str(&format!(
            "<IsTruncated>{}</IsTruncated>",
            if is_truncated { "true" } else { "false" }
        ));
        if let Some(next) = &next_token {
            xml.push_str(&format!(
                "<NextContinuationToken>{}</NextContinuationToken>",
                next
            ));
        }
        for (key, size) in page {
            xml.push_str(&format!(
                "<Contents><Key>{}</Key><LastModified>2025-11-01T00:00:00.000Z</LastModified>\
                 <ETag>\"e\"</ETag><Size>{}</Size></Contents>",
                key, size
            ));
        }
        xml.push_str("</ListBucketResult>");

        ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
    }

    async fn spawn_backend() -> (SocketAddr, Shared) {
        let state: Shared = Arc::new(Mutex::new(FakeBackend::default()));
        let app = Router::new()
            .route("/cp/v1/buckets", post(cp_create).get(cp_list))
            .route("/cp/v1/buckets/{name}", get(cp_get).delete(cp_delete))
            .route("/dp/{bucket}", get(dp_list))
            .route(
                "/dp/{bucket}/{*key}",
                axum::routing::put(dp_put).get(dp_get).delete(dp_delete),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    async fn test_gateway(tenant_cap: i64) -> (Gateway, Shared) {
        let (addr, state) = spawn_backend().await;
        let http = remote::build_http_client(Duration::from_secs(5)).unwrap();
        let buckets = RemoteBucketClient::new(http.clone(), format!("http://{}/cp", addr), "");
        let objects = RemoteObjectClient::new(http, format!("http://{}/dp", addr), "");
        let gateway = Gateway::new(test_pool().await, buckets, objects, 10, tenant_cap);
        (gateway, state)
    }

    fn caller(addr: &str) -> Caller {
        Caller(addr.to_string())
    }

    fn payload(n: usize) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        futures::stream::once(async move { Ok(Bytes::from(vec![b'x'; n])) })
    }

    const GIB: i64 = 1024 * 1024 * 1024;

    // ---- object semantics ----

    #[tokio::test]
    async fn quota_admission_boundary() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "photos", None).await.unwrap();
        gw.set_quota(&owner, bucket.id, Some(1000)).await.unwrap();

        gw.put_object(&owner, bucket.id, "seed", None, Some(900), payload(900))
            .await
            .unwrap();
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 900);

        // 900 + 50 <= 1000
        gw.put_object(&owner, bucket.id, "small", None, Some(50), payload(50))
            .await
            .unwrap();
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 950);

        // 950 + 150 > 1000
        let err = gw
            .put_object(&owner, bucket.id, "big", None, Some(150), payload(150))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "quota_exceeded");
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 950);
    }

    #[tokio::test]
    async fn zero_quota_blocks_all_writes() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "frozen", None).await.unwrap();
        gw.set_quota(&owner, bucket.id, Some(0)).await.unwrap();

        let err = gw
            .put_object(&owner, bucket.id, "any", None, Some(1), payload(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "quota_exceeded");
    }

    #[tokio::test]
    async fn finite_quota_requires_declared_length() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "strict", None).await.unwrap();
        gw.set_quota(&owner, bucket.id, Some(1000)).await.unwrap();

        let err = gw
            .put_object(&owner, bucket.id, "nolen", None, None, payload(10))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::LengthRequired));
        assert_eq!(err.status().as_u16(), 411);
    }

    #[tokio::test]
    async fn overwrite_accounts_net_delta() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "docs", None).await.unwrap();

        gw.put_object(&owner, bucket.id, "report", None, Some(300), payload(300))
            .await
            .unwrap();
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 300);

        // Shrinking overwrite: delta is 120 - 300 = -180.
        gw.put_object(&owner, bucket.id, "report", None, Some(120), payload(120))
            .await
            .unwrap();
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 120);

        // Growing overwrite back up.
        gw.put_object(&owner, bucket.id, "report", None, Some(500), payload(500))
            .await
            .unwrap();
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 500);
    }

    #[tokio::test]
    async fn untracked_write_leaves_counter_for_reconcile() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "loose", None).await.unwrap();

        // No quota, no declared length: the write lands but is not metered.
        let outcome = gw
            .put_object(&owner, bucket.id, "blob", None, None, payload(640))
            .await
            .unwrap();
        // Size in the response comes from asking the backend afterwards.
        assert_eq!(outcome.size, 640);
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 0);

        let report = gw.reconcile(&owner, bucket.id).await.unwrap();
        assert_eq!(report.previous_bytes, 0);
        assert_eq!(report.actual_bytes, 640);
        assert_eq!(report.delta_bytes, 640);
    }

    #[tokio::test]
    async fn tenant_cap_spans_buckets_without_quotas() {
        let (gw, _state) = test_gateway(1000).await;
        let owner = caller("0xabc");
        let a = gw.create_bucket(&owner, "first", None).await.unwrap();
        let b = gw.create_bucket(&owner, "second", None).await.unwrap();

        gw.put_object(&owner, a.id, "x", None, Some(600), payload(600))
            .await
            .unwrap();

        // Neither bucket has a quota, but 600 + 500 > 1000 for the tenant.
        let err = gw
            .put_object(&owner, b.id, "y", None, Some(500), payload(500))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "storage_limit_exceeded");

        // A different tenant is unaffected.
        let other = caller("0xdef");
        let c = gw.create_bucket(&other, "theirs", None).await.unwrap();
        gw.put_object(&other, c.id, "z", None, Some(500), payload(500))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_decrements_and_tolerates_missing_objects() {
        let (gw, state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "bin", None).await.unwrap();

        gw.put_object(&owner, bucket.id, "tmp", None, Some(200), payload(200))
            .await
            .unwrap();
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 200);

        gw.delete_object(&owner, bucket.id, "tmp").await.unwrap();
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 0);

        // Deleting again: already gone on the backend, no error, no change.
        gw.delete_object(&owner, bucket.id, "tmp").await.unwrap();
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 0);

        let backend_name = gw.registry.get(bucket.id).await.unwrap().backend_name;
        assert!(
            state
                .lock()
                .unwrap()
                .objects
                .get(&backend_name)
                .map(|m| m.is_empty())
                .unwrap_or(true)
        );
    }

    #[tokio::test]
    async fn reconcile_counts_out_of_band_objects_and_is_idempotent() {
        let (gw, state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "drifty", None).await.unwrap();
        let backend_name = gw.registry.get(bucket.id).await.unwrap().backend_name;

        // Objects placed behind the gateway's back.
        {
            let mut backend = state.lock().unwrap();
            let map = backend.objects.get_mut(&backend_name).unwrap();
            for (key, size) in [("a", 100usize), ("b", 250), ("c", 4)] {
                map.insert(
                    key.to_string(),
                    StoredObject {
                        data: vec![0u8; size],
                        content_type: None,
                    },
                );
            }
        }

        let first = gw.reconcile(&owner, bucket.id).await.unwrap();
        assert_eq!(first.previous_bytes, 0);
        assert_eq!(first.actual_bytes, 354);
        assert_eq!(first.delta_bytes, 354);
        assert_eq!(gw.get_quota(&owner, bucket.id).await.unwrap().usage_bytes, 354);

        let second = gw.reconcile(&owner, bucket.id).await.unwrap();
        assert_eq!(second.delta_bytes, 0);
        assert_eq!(second.actual_bytes, 354);
    }

    #[tokio::test]
    async fn reconcile_pages_through_large_listings() {
        let (gw, state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "big", None).await.unwrap();
        let backend_name = gw.registry.get(bucket.id).await.unwrap().backend_name;

        {
            let mut backend = state.lock().unwrap();
            let map = backend.objects.get_mut(&backend_name).unwrap();
            for i in 0..2500 {
                map.insert(
                    format!("obj-{:05}", i),
                    StoredObject {
                        data: vec![0u8; 2],
                        content_type: None,
                    },
                );
            }
        }

        let report = gw.reconcile(&owner, bucket.id).await.unwrap();
        assert_eq!(report.actual_bytes, 5000);
    }

    #[tokio::test]
    async fn download_streams_body_and_headers() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "media", None).await.unwrap();

        gw.put_object(
            &owner,
            bucket.id,
            "song.mp3",
            Some("audio/mpeg".into()),
            Some(32),
            payload(32),
        )
        .await
        .unwrap();

        let download = gw.get_object(&owner, bucket.id, "song.mp3").await.unwrap();
        assert_eq!(download.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(download.content_length, Some(32));
        assert!(download.etag.is_some());

        let mut collected = Vec::new();
        let mut stream = Box::pin(download.into_stream());
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, vec![b'x'; 32]);
    }

    #[tokio::test]
    async fn missing_object_maps_to_not_found() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "sparse", None).await.unwrap();

        let err = gw.get_object(&owner, bucket.id, "ghost").await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn listing_paginates_with_opaque_cursors() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "paged", None).await.unwrap();

        for key in ["a.txt", "b.txt", "c.txt"] {
            gw.put_object(&owner, bucket.id, key, None, Some(10), payload(10))
                .await
                .unwrap();
        }

        let first = gw
            .list_objects(&owner, bucket.id, None, Some(2), None)
            .await
            .unwrap();
        assert_eq!(first.objects.len(), 2);
        assert!(first.is_truncated);
        let cursor = first.next_cursor.expect("cursor for next page");

        let second = gw
            .list_objects(&owner, bucket.id, None, Some(2), Some(cursor))
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert!(!second.is_truncated);
        assert!(second.next_cursor.is_none());
        assert_eq!(second.objects[0].key, "c.txt");
    }

    #[tokio::test]
    async fn listing_honors_prefix() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "mixed", None).await.unwrap();

        for key in ["logs/1", "logs/2", "data/1"] {
            gw.put_object(&owner, bucket.id, key, None, Some(5), payload(5))
                .await
                .unwrap();
        }

        let page = gw
            .list_objects(&owner, bucket.id, Some("logs/".into()), None, None)
            .await
            .unwrap();
        assert_eq!(page.objects.len(), 2);
        assert!(page.objects.iter().all(|o| o.key.starts_with("logs/")));
    }

    // ---- ownership and lifecycle ----

    #[tokio::test]
    async fn ownership_is_enforced_before_any_remote_call() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let stranger = caller("0xdef");
        let bucket = gw.create_bucket(&owner, "private", None).await.unwrap();

        let err = gw.get_bucket(&stranger, bucket.id).await.unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let err = gw
            .put_object(&stranger, bucket.id, "k", None, Some(1), payload(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let err = gw.get_bucket(&owner, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn invalid_names_and_keys_are_rejected_locally() {
        let (gw, state) = test_gateway(GIB).await;
        let owner = caller("0xabc");

        let err = gw.create_bucket(&owner, "ab", None).await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        assert!(state.lock().unwrap().buckets.is_empty());

        let bucket = gw.create_bucket(&owner, "abc", None).await.unwrap();
        let err = gw
            .put_object(&owner, bucket.id, "/bad", None, Some(1), payload(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[tokio::test]
    async fn bucket_delete_removes_remote_and_local_state() {
        let (gw, state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "doomed", None).await.unwrap();
        let backend_name = gw.registry.get(bucket.id).await.unwrap().backend_name;

        gw.delete_bucket(&owner, bucket.id).await.unwrap();
        assert!(!state.lock().unwrap().buckets.contains(&backend_name));
        assert_eq!(gw.get_bucket(&owner, bucket.id).await.unwrap_err().code(), "not_found");
    }

    #[tokio::test]
    async fn bucket_delete_tolerates_missing_backend_bucket() {
        let (gw, state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "halfgone", None).await.unwrap();
        let backend_name = gw.registry.get(bucket.id).await.unwrap().backend_name;

        // Backend bucket vanished out from under us.
        state.lock().unwrap().buckets.remove(&backend_name);

        gw.delete_bucket(&owner, bucket.id).await.unwrap();
        assert_eq!(gw.get_bucket(&owner, bucket.id).await.unwrap_err().code(), "not_found");
    }

    #[tokio::test]
    async fn duplicate_create_skips_remote_call() {
        let (gw, state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        gw.create_bucket(&owner, "photos", None).await.unwrap();
        assert_eq!(state.lock().unwrap().buckets.len(), 1);

        let err = gw.create_bucket(&owner, "photos", None).await.unwrap_err();
        assert_eq!(err.code(), "bucket_name_taken");
        // No second backend bucket was created.
        assert_eq!(state.lock().unwrap().buckets.len(), 1);

        // Same tenant-facing name for another owner maps to a fresh backend
        // bucket.
        gw.create_bucket(&caller("0xdef"), "photos", None).await.unwrap();
        assert_eq!(state.lock().unwrap().buckets.len(), 2);
    }

    #[tokio::test]
    async fn quota_endpoint_reports_percentage() {
        let (gw, _state) = test_gateway(GIB).await;
        let owner = caller("0xabc");
        let bucket = gw.create_bucket(&owner, "pct", None).await.unwrap();

        let status = gw.set_quota(&owner, bucket.id, Some(1000)).await.unwrap();
        assert_eq!(status.usage_pct(), Some(0.0));

        gw.put_object(&owner, bucket.id, "k", None, Some(333), payload(333))
            .await
            .unwrap();
        let status = gw.get_quota(&owner, bucket.id).await.unwrap();
        assert_eq!(status.usage_pct(), Some(33.3));

        let status = gw.set_quota(&owner, bucket.id, None).await.unwrap();
        assert_eq!(status.usage_pct(), None);
    }
}
