//! HTTP handlers for bucket lifecycle operations.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::Caller, errors::GatewayError, models::bucket::Bucket, services::gateway::Gateway};

#[derive(Debug, Deserialize)]
pub struct CreateBucketReq {
    pub name: String,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListBucketsQuery {
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Serialize)]
pub struct ListBucketsResponse {
    pub buckets: Vec<Bucket>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// POST `/buckets` — create a bucket and its remote backing store.
pub async fn create_bucket(
    State(gateway): State<Gateway>,
    caller: Caller,
    Json(req): Json<CreateBucketReq>,
) -> Result<impl IntoResponse, GatewayError> {
    let bucket = gateway
        .create_bucket(&caller, &req.name, req.location)
        .await?;
    Ok((StatusCode::CREATED, Json(bucket)))
}

/// GET `/buckets` — list the caller's buckets, paginated.
pub async fn list_buckets(
    State(gateway): State<Gateway>,
    caller: Caller,
    Query(q): Query<ListBucketsQuery>,
) -> Result<Json<ListBucketsResponse>, GatewayError> {
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let page = q.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let (buckets, total) = gateway.list_buckets(&caller, limit, offset).await?;
    Ok(Json(ListBucketsResponse {
        buckets,
        page,
        limit,
        total,
    }))
}

/// GET `/buckets/{id}` — fetch one bucket.
pub async fn get_bucket(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Bucket>, GatewayError> {
    Ok(Json(gateway.get_bucket(&caller, id).await?))
}

/// DELETE `/buckets/{id}` — delete a bucket and its remote backing store.
pub async fn delete_bucket(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    gateway.delete_bucket(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
