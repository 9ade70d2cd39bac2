//! Upload records and their lifecycle status.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a tracked upload.
///
/// `Pending -> Completed | Failed -> Deleting -> (erased)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Completed,
    Failed,
    Deleting,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
            UploadStatus::Deleting => "deleting",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one stored payload.
///
/// `storage_path` is always `<root>/<owner_id>/<filename>`.  All three are
/// fixed by the constructor and only readable from outside the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    pub id: String,
    pub(crate) filename: String,
    storage_path: PathBuf,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub(crate) owner_id: String,
    pub status: UploadStatus,
}

impl UploadRecord {
    pub(crate) fn new(
        root: &Path,
        id: String,
        owner_id: &str,
        filename: &str,
        size_bytes: u64,
        uploaded_at: DateTime<Utc>,
        status: UploadStatus,
    ) -> Self {
        Self {
            id,
            filename: filename.to_string(),
            storage_path: root.join(owner_id).join(filename),
            size_bytes,
            uploaded_at,
            owner_id: owner_id.to_string(),
            status,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }
}
