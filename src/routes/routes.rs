//! Defines routes for bucket, object, and quota operations.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `POST   /buckets` — create bucket
//!   - `GET    /buckets` — list caller's buckets (paginated)
//!   - `GET    /buckets/{id}` — fetch one bucket
//!   - `DELETE /buckets/{id}` — delete bucket and remote backing store
//!
//! - **Object-level endpoints**
//!   - `GET    /buckets/{id}/objects` — list objects (prefix, limit, cursor)
//!   - `PUT    /buckets/{id}/objects/{*key}` — upload object
//!   - `GET    /buckets/{id}/objects/{*key}` — download object
//!   - `DELETE /buckets/{id}/objects/{*key}` — delete object
//!
//! - **Quota endpoints**
//!   - `GET  /buckets/{id}/quota` — quota + cached usage + percentage
//!   - `PUT  /buckets/{id}/quota` — set or clear the quota
//!   - `POST /buckets/{id}/quota/reconcile` — recompute usage from the backend
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, get_bucket, list_buckets},
        health_handlers::{healthz, readyz},
        object_handlers::{delete_object, get_object, list_objects, upload_object},
        quota_handlers::{get_quota, reconcile_quota, set_quota},
    },
    services::gateway::Gateway,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router for the whole gateway surface.
///
/// The router carries shared state (`Gateway`) to all handlers.
pub fn routes() -> Router<Gateway> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/buckets", post(create_bucket).get(list_buckets))
        .route("/buckets/{id}", get(get_bucket).delete(delete_bucket))
        // Object-level routes
        .route("/buckets/{id}/objects", get(list_objects))
        .route(
            "/buckets/{id}/objects/{*key}",
            put(upload_object).get(get_object).delete(delete_object),
        )
        // Quota routes
        .route("/buckets/{id}/quota", get(get_quota).put(set_quota))
        .route("/buckets/{id}/quota/reconcile", post(reconcile_quota))
}
