//! Quota Ledger — quota and usage columns on a bucket row.
//!
//! `usage_bytes` is a cache of the backend's true consumption, not a
//! source of truth. Increment/decrement are single-statement arithmetic
//! against the stored counter so concurrent writers to the same bucket
//! cannot lose an update; the check-then-act window around them is the
//! gateway's concern (see `gateway.rs`).

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{GatewayError, GatewayResult};

/// Quota and cached usage for one bucket.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub quota_bytes: Option<i64>,
    pub usage_bytes: i64,
}

impl QuotaStatus {
    /// Percentage of quota in use, rounded to two decimals. `None` when the
    /// bucket is unlimited or its quota is zero.
    pub fn usage_pct(&self) -> Option<f64> {
        match self.quota_bytes {
            Some(quota) if quota > 0 => {
                let pct = self.usage_bytes as f64 / quota as f64 * 100.0;
                Some((pct * 100.0).round() / 100.0)
            }
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct QuotaLedger {
    db: Arc<SqlitePool>,
}

impl QuotaLedger {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn get_quota(&self, bucket_id: Uuid) -> GatewayResult<QuotaStatus> {
        let row = sqlx::query_as::<_, (Option<i64>, i64)>(
            "SELECT quota_bytes, usage_bytes FROM buckets WHERE id = ?",
        )
        .bind(bucket_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => GatewayError::NotFound,
            other => GatewayError::Database(other),
        })?;

        Ok(QuotaStatus {
            quota_bytes: row.0,
            usage_bytes: row.1,
        })
    }

    /// Set or clear the quota. `None` means unlimited; zero is legal and
    /// blocks all writes at admission time.
    pub async fn set_quota(&self, bucket_id: Uuid, quota_bytes: Option<i64>) -> GatewayResult<()> {
        if let Some(quota) = quota_bytes {
            if quota < 0 {
                return Err(GatewayError::InvalidRequest(
                    "quota_bytes must be a non-negative integer or null".into(),
                ));
            }
        }

        let result = sqlx::query("UPDATE buckets SET quota_bytes = ?, updated_at = ? WHERE id = ?")
            .bind(quota_bytes)
            .bind(Utc::now())
            .bind(bucket_id)
            .execute(&*self.db)
            .await
            .map_err(GatewayError::Database)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound);
        }
        Ok(())
    }

    pub async fn increment_usage(&self, bucket_id: Uuid, delta: i64) -> GatewayResult<()> {
        self.apply_delta(bucket_id, delta).await
    }

    pub async fn decrement_usage(&self, bucket_id: Uuid, delta: i64) -> GatewayResult<()> {
        self.apply_delta(bucket_id, -delta).await
    }

    /// Overwrite the cached counter. Reconciliation's correction path.
    pub async fn set_usage(&self, bucket_id: Uuid, value: i64) -> GatewayResult<()> {
        if value < 0 {
            return Err(GatewayError::InvalidRequest(
                "usage_bytes must be non-negative".into(),
            ));
        }

        let result = sqlx::query("UPDATE buckets SET usage_bytes = ?, updated_at = ? WHERE id = ?")
            .bind(value)
            .bind(Utc::now())
            .bind(bucket_id)
            .execute(&*self.db)
            .await
            .map_err(GatewayError::Database)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound);
        }
        Ok(())
    }

    /// Sum of cached usage across all of an owner's buckets, for the
    /// global per-tenant cap.
    pub async fn total_usage_by_owner(&self, owner: &str) -> GatewayResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(usage_bytes), 0) FROM buckets WHERE owner = ?",
        )
        .bind(owner)
        .fetch_one(&*self.db)
        .await
        .map_err(GatewayError::Database)
    }

    /// Single-statement arithmetic update. MAX keeps the counter from ever
    /// going negative when a decrement races a reconcile overwrite.
    async fn apply_delta(&self, bucket_id: Uuid, delta: i64) -> GatewayResult<()> {
        let result = sqlx::query(
            "UPDATE buckets SET usage_bytes = MAX(usage_bytes + ?, 0), updated_at = ? \
             WHERE id = ?",
        )
        .bind(delta)
        .bind(Utc::now())
        .bind(bucket_id)
        .execute(&*self.db)
        .await
        .map_err(GatewayError::Database)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound);
        }
        Ok(())
    }
}
