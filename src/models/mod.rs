//! Domain models
//!
//! Plain data structs handed between the repositories, services, and web
//! layer; conversions from the SeaORM entity models live here so the rest of
//! the crate never touches `ActiveModel` machinery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub sha256: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub download_count: i64,
}

impl FileRecord {
    /// Expiry is inclusive: a record expiring exactly now is already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl From<entities::file_records::Model> for FileRecord {
    fn from(m: entities::file_records::Model) -> Self {
        Self {
            id: m.id,
            filename: m.filename,
            content_type: m.content_type,
            size_bytes: m.size_bytes,
            sha256: m.sha256,
            uploaded_at: m.uploaded_at,
            expires_at: m.expires_at,
            download_count: m.download_count,
        }
    }
}

/// Metadata for a freshly staged upload, ready to be inserted
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub sha256: Option<String>,
    /// Upload instant; expiry offsets are measured from this timestamp
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Counters from one expired-file sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Records whose bytes and metadata were both removed
    pub deleted: usize,
    /// Records left in place for the next sweep to retry
    pub failed: usize,
}
