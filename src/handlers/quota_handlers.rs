//! HTTP handlers for quota inspection, quota updates, and reconciliation.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::Caller,
    errors::GatewayError,
    services::{gateway::Gateway, quota::QuotaStatus, reconcile::ReconcileOutcome},
};

#[derive(Debug, Deserialize)]
pub struct SetQuotaReq {
    /// `null` clears the quota; `0` blocks all writes.
    pub quota_bytes: Option<i64>,
}

#[derive(Serialize)]
pub struct QuotaResponse {
    pub bucket_id: Uuid,
    pub quota_bytes: Option<i64>,
    pub usage_bytes: i64,
    pub usage_pct: Option<f64>,
}

impl QuotaResponse {
    fn from_status(bucket_id: Uuid, status: QuotaStatus) -> Self {
        Self {
            bucket_id,
            usage_pct: status.usage_pct(),
            quota_bytes: status.quota_bytes,
            usage_bytes: status.usage_bytes,
        }
    }
}

/// GET `/buckets/{id}/quota`
pub async fn get_quota(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotaResponse>, GatewayError> {
    let status = gateway.get_quota(&caller, id).await?;
    Ok(Json(QuotaResponse::from_status(id, status)))
}

/// PUT `/buckets/{id}/quota`
pub async fn set_quota(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<SetQuotaReq>,
) -> Result<Json<QuotaResponse>, GatewayError> {
    let status = gateway.set_quota(&caller, id, req.quota_bytes).await?;
    Ok(Json(QuotaResponse::from_status(id, status)))
}

/// POST `/buckets/{id}/quota/reconcile`
///
/// Full remote enumeration; O(object count). Expensive by contract, so it
/// only ever runs when a caller asks for it.
pub async fn reconcile_quota(
    State(gateway): State<Gateway>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconcileOutcome>, GatewayError> {
    Ok(Json(gateway.reconcile(&caller, id).await?))
}
