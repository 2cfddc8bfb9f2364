//! Represents a tenant bucket — the unit of quota accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant-scoped bucket mapping to one bucket on the remote backend.
///
/// The gateway owns this record; the remote store only ever sees
/// `backend_name`. Tenant-chosen names are unique per owner, not globally,
/// which is why the backend identity is generated rather than derived from
/// the name.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Gateway-facing identifier, opaque to the backend.
    pub id: Uuid,

    /// Name used on the remote store. Never exposed to tenants.
    #[serde(skip_serializing)]
    pub backend_name: String,

    /// Tenant-chosen label, unique per owner only.
    pub name: String,

    /// Tenant address that created the bucket. Immutable.
    pub owner: String,

    /// Optional region hint, informational only.
    pub location: Option<String>,

    /// Upper bound on usage in bytes. `None` means unlimited, `0` means no
    /// writes allowed.
    pub quota_bytes: Option<i64>,

    /// Cached sum of object sizes in the backend bucket. Advisory; may
    /// drift until the next reconciliation.
    pub usage_bytes: i64,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,

    /// Touched only by quota/usage mutation.
    pub updated_at: DateTime<Utc>,
}
