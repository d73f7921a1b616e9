//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for a single stored object.
///
/// The payload bytes live on disk; this struct only carries what SQLite knows.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload.
    pub etag: Option<String>,

    /// Timestamp when object was last modified.
    pub last_modified: DateTime<Utc>,
}

/// Snapshot of a remote object as seen by one listing call.
///
/// Never cached: every listing re-reads the store.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StorageObject {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

impl From<Object> for StorageObject {
    fn from(object: Object) -> Self {
        Self {
            key: object.key,
            size: object.size_bytes,
            last_modified: object.last_modified,
        }
    }
}
