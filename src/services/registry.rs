//! Bucket Registry — the authoritative bucket metadata store.
//!
//! Owns the mapping from gateway-facing bucket identity to backend bucket
//! identity, plus the quota/usage columns the ledger operates on. Every
//! method here is pure metadata: no remote I/O, ever.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{GatewayError, GatewayResult};
use crate::models::bucket::Bucket;

#[derive(Clone)]
pub struct BucketRegistry {
    db: Arc<SqlitePool>,
    max_buckets_per_owner: u32,
}

impl BucketRegistry {
    pub fn new(db: Arc<SqlitePool>, max_buckets_per_owner: u32) -> Self {
        Self {
            db,
            max_buckets_per_owner,
        }
    }

    /// Cheap local admission check, run before any remote call is made on
    /// the tenant's behalf: duplicate `(owner, name)` and the per-tenant
    /// bucket-count limit are both rejected here.
    pub async fn ensure_can_create(&self, owner: &str, name: &str) -> GatewayResult<()> {
        if self.get_by_owner_and_name(owner, name).await?.is_some() {
            return Err(GatewayError::BucketNameTaken);
        }
        if self.count_by_owner(owner).await? >= self.max_buckets_per_owner as i64 {
            return Err(GatewayError::BucketLimitExceeded);
        }
        Ok(())
    }

    /// Insert a new bucket row. The backend-side name is generated here and
    /// never derived from the tenant-chosen name: tenant names may collide
    /// across owners and be reused after deletion.
    pub async fn create(
        &self,
        name: &str,
        owner: &str,
        location: Option<String>,
    ) -> GatewayResult<Bucket> {
        let now = Utc::now();
        let bucket = Bucket {
            id: Uuid::new_v4(),
            backend_name: format!("b-{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            owner: owner.to_string(),
            location,
            quota_bytes: None,
            usage_bytes: 0,
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            "INSERT INTO buckets (id, backend_name, name, owner, location, quota_bytes, \
             usage_bytes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, NULL, 0, ?, ?)",
        )
        .bind(bucket.id)
        .bind(&bucket.backend_name)
        .bind(&bucket.name)
        .bind(&bucket.owner)
        .bind(&bucket.location)
        .bind(bucket.created_at)
        .bind(bucket.updated_at)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(bucket),
            // The unique index closes the race between ensure_can_create
            // and this insert.
            Err(err) if is_unique_violation(&err) => Err(GatewayError::BucketNameTaken),
            Err(err) => Err(GatewayError::Database(err)),
        }
    }

    pub async fn get(&self, id: Uuid) -> GatewayResult<Bucket> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, backend_name, name, owner, location, quota_bytes, usage_bytes,
                    created_at, updated_at
             FROM buckets WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => GatewayError::NotFound,
            other => GatewayError::Database(other),
        })
    }

    pub async fn get_by_owner_and_name(
        &self,
        owner: &str,
        name: &str,
    ) -> GatewayResult<Option<Bucket>> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, backend_name, name, owner, location, quota_bytes, usage_bytes,
                    created_at, updated_at
             FROM buckets WHERE owner = ? AND name = ?",
        )
        .bind(owner)
        .bind(name)
        .fetch_optional(&*self.db)
        .await
        .map_err(GatewayError::Database)
    }

    pub async fn list_by_owner(
        &self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> GatewayResult<Vec<Bucket>> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, backend_name, name, owner, location, quota_bytes, usage_bytes,
                    created_at, updated_at
             FROM buckets WHERE owner = ?
             ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        )
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.db)
        .await
        .map_err(GatewayError::Database)
    }

    pub async fn count_by_owner(&self, owner: &str) -> GatewayResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM buckets WHERE owner = ?")
            .bind(owner)
            .fetch_one(&*self.db)
            .await
            .map_err(GatewayError::Database)
    }

    pub async fn delete(&self, id: Uuid) -> GatewayResult<()> {
        let result = sqlx::query("DELETE FROM buckets WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await
            .map_err(GatewayError::Database)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound);
        }
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
