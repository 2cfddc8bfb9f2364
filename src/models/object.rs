//! Transient views of remote objects.
//!
//! Objects are never stored locally. The gateway observes them through
//! HEAD and LIST responses and forgets them when the request ends; a local
//! object table would be a second source of truth for object existence.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of a remote listing page.
#[derive(Serialize, Clone, Debug)]
pub struct ObjectRecord {
    /// Object key within the bucket.
    pub key: String,

    /// Size in bytes as reported by the backend.
    pub size: i64,

    /// Backend checksum, if reported.
    pub etag: Option<String>,

    /// Last modification time, if reported.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Metadata observed via a HEAD call.
#[derive(Clone, Debug)]
pub struct ObjectStat {
    pub size: i64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}
