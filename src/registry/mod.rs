//! Upload registry.
//!
//! [`UploadRegistry`] owns the storage root, the size/type policy, and an
//! in-memory index of uploads ingested by this process.  The index is guarded
//! by a mutex that is only ever held for map operations; every filesystem
//! call happens outside it.  The files on disk are the durable source of
//! truth: listing and fetching scan the directory tree rather than the index,
//! and a restart simply starts with an empty index.

pub mod layout;
pub mod policy;
pub mod record;
pub mod sweep;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::{UploadError, UploadResult, ValidationError};
use crate::metrics as m;

pub use layout::StorageLayout;
pub use policy::UploadPolicy;
pub use record::{UploadRecord, UploadStatus};
pub use sweep::CleanupReport;

type Index = HashMap<String, UploadRecord>;

pub struct UploadRegistry {
    layout: StorageLayout,
    policy: UploadPolicy,
    index: Mutex<Index>,
}

impl UploadRegistry {
    /// Create a registry rooted at `root`.
    ///
    /// The root directory is created if it does not exist.
    pub fn new(root: impl Into<PathBuf>, policy: UploadPolicy) -> UploadResult<Self> {
        let layout = StorageLayout::new(root);
        std::fs::create_dir_all(layout.root()).map_err(|source| {
            UploadError::StorageUnavailable {
                path: layout.root().to_path_buf(),
                source,
            }
        })?;
        Ok(Self {
            layout,
            policy,
            index: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &Config) -> UploadResult<Self> {
        let root = config.storage_root()?;
        Self::new(root, config.policy.clone().into())
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Lock the index.  The active-uploads gauge is only set while this
    /// guard is held so concurrent updates cannot publish a stale size.
    fn index(&self) -> MutexGuard<'_, Index> {
        // A panic while holding the guard cannot leave a half-applied map
        // operation behind, so a poisoned index is still usable.
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Ingest ──────────────────────────────────────────────────────

    /// Store `payload` as `<root>/<owner_id>/<filename>` and track it.
    ///
    /// The record is indexed as soon as the write succeeds and validated
    /// afterwards.  A policy violation removes the file, leaves the record in
    /// the index as [`UploadStatus::Failed`], and returns
    /// [`UploadError::ValidationFailed`].
    pub async fn ingest<R>(
        &self,
        owner_id: &str,
        filename: &str,
        mut payload: R,
    ) -> UploadResult<UploadRecord>
    where
        R: AsyncRead + Unpin,
    {
        let owner_dir = self.layout.owner_dir(owner_id)?;
        let storage_path = self.layout.file_path(owner_id, filename)?;

        let mut record = UploadRecord::new(
            self.layout.root(),
            uuid::Uuid::new_v4().to_string(),
            owner_id,
            filename,
            0,
            Utc::now(),
            UploadStatus::Pending,
        );
        debug!("Ingesting {} for owner {} as {}", filename, owner_id, record.id);

        let written = match self
            .write_payload(&owner_dir, &storage_path, &mut payload)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                counter!(m::UPLOADS_TOTAL, "status" => "write_failed").increment(1);
                return Err(e);
            }
        };

        record.size_bytes = written;
        record.status = UploadStatus::Completed;
        {
            let mut index = self.index();
            index.insert(record.id.clone(), record.clone());
            gauge!(m::ACTIVE_UPLOADS).set(index.len() as f64);
        }

        if let Err(source) = self.policy.validate(written, filename) {
            self.reject(&mut record, &source).await;
            return Err(UploadError::ValidationFailed {
                id: record.id,
                source,
            });
        }

        counter!(m::UPLOADS_TOTAL, "status" => "completed").increment(1);
        counter!(m::BYTES_INGESTED_TOTAL).increment(written);
        info!(
            owner_id,
            upload_id = %record.id,
            size = written,
            "Stored {:?}",
            storage_path
        );
        Ok(record)
    }

    /// [`ingest`](Self::ingest) for an in-memory payload.
    pub async fn ingest_bytes(
        &self,
        owner_id: &str,
        filename: &str,
        data: Bytes,
    ) -> UploadResult<UploadRecord> {
        self.ingest(owner_id, filename, &data[..]).await
    }

    /// Copy `payload` into a temp file under `.tmp/`, fsync it, and rename
    /// it onto `dest`.  The temp file is deleted on every failure path and
    /// when the future is dropped before the rename.
    async fn write_payload<R>(&self, owner_dir: &Path, dest: &Path, payload: &mut R) -> UploadResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let tmp_dir = self.layout.tmp_dir();
        for dir in [owner_dir, tmp_dir.as_path()] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| UploadError::StorageUnavailable {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let temp = NamedTempFile::new_in(&tmp_dir).map_err(|source| {
            UploadError::StorageUnavailable {
                path: tmp_dir.clone(),
                source,
            }
        })?;
        let handle = temp
            .as_file()
            .try_clone()
            .map_err(|source| UploadError::StorageUnavailable {
                path: temp.path().to_path_buf(),
                source,
            })?;
        let mut file = tokio::fs::File::from_std(handle);

        let written = match copy_and_sync(payload, &mut file).await {
            Ok(written) => written,
            Err(source) => {
                warn!("Write to {:?} aborted: {}", dest, source);
                return Err(UploadError::WriteFailed {
                    path: dest.to_path_buf(),
                    source,
                });
            }
        };
        drop(file);

        temp.persist(dest).map_err(|e| UploadError::WriteFailed {
            path: dest.to_path_buf(),
            source: e.error,
        })?;
        Ok(written)
    }

    /// Undo a stored upload that failed validation.
    async fn reject(&self, record: &mut UploadRecord, reason: &ValidationError) {
        warn!(
            owner_id = %record.owner_id,
            upload_id = %record.id,
            "Rejected {}: {}",
            record.filename,
            reason
        );
        counter!(m::UPLOADS_TOTAL, "status" => "failed").increment(1);

        if let Err(e) = tokio::fs::remove_file(record.storage_path()).await {
            warn!(
                "Failed to remove rejected upload {:?}: {}",
                record.storage_path(),
                e
            );
        }

        record.status = UploadStatus::Failed;
        if let Some(indexed) = self.index().get_mut(&record.id) {
            indexed.status = UploadStatus::Failed;
        }
    }

    // ── Listing / fetch ─────────────────────────────────────────────

    /// Scan `<root>/<owner_id>` and describe every file in it.
    ///
    /// Records are sorted by filename and always report
    /// [`UploadStatus::Completed`].  A file that is tracked by a completed
    /// index entry carries that entry's id; any other file uses its filename
    /// as id.  Entries whose metadata cannot be read are skipped.
    pub async fn list_uploads(&self, owner_id: &str) -> UploadResult<Vec<UploadRecord>> {
        let dir = self.layout.owner_dir(owner_id)?;
        let not_found = |source: std::io::Error| UploadError::DirectoryNotFound {
            path: dir.clone(),
            source,
        };
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(not_found)?;
        let tracked = self.tracked_ids(owner_id);

        let mut uploads = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(not_found)? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Failed to get file info for {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            if metadata.is_dir() {
                continue;
            }
            let Ok(filename) = entry.file_name().into_string() else {
                warn!("Skipping non UTF-8 file name {:?}", entry.path());
                continue;
            };
            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("Failed to get file info for {:?}: {}", entry.path(), e);
                    continue;
                }
            };

            let id = tracked
                .get(&filename)
                .cloned()
                .unwrap_or_else(|| filename.clone());
            uploads.push(UploadRecord::new(
                self.layout.root(),
                id,
                owner_id,
                &filename,
                metadata.len(),
                DateTime::<Utc>::from(modified),
                UploadStatus::Completed,
            ));
        }

        uploads.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(uploads)
    }

    /// Describe a single stored file.
    ///
    /// `upload_id` is either an id from the index (owned by `owner_id`) or a
    /// filename under the owner's directory.
    pub async fn get_upload(&self, upload_id: &str, owner_id: &str) -> UploadResult<UploadRecord> {
        let filename = self.resolve_filename(upload_id, owner_id);
        let path = self.layout.file_path(owner_id, &filename)?;
        let not_found = |source: std::io::Error| UploadError::NotFound {
            path: path.clone(),
            source,
        };

        let file = tokio::fs::File::open(&path).await.map_err(not_found)?;
        let metadata = file.metadata().await.map_err(not_found)?;
        if !metadata.is_file() {
            return Err(not_found(std::io::Error::other("not a regular file")));
        }
        let modified = metadata.modified().map_err(not_found)?;

        Ok(UploadRecord::new(
            self.layout.root(),
            upload_id.to_string(),
            owner_id,
            &filename,
            metadata.len(),
            DateTime::<Utc>::from(modified),
            UploadStatus::Completed,
        ))
    }

    // ── Delete ──────────────────────────────────────────────────────

    /// Remove a stored file and erase the index entries describing it.
    ///
    /// Entries are marked [`UploadStatus::Deleting`] first and erased only
    /// once the file is gone.  If the file was already absent the entries are
    /// erased and [`UploadError::NotFound`] is returned; any other removal
    /// failure restores their previous status and returns
    /// [`UploadError::DeleteFailed`].  Ids the index does not know are not an
    /// error here: removal is attempted on the filesystem directly.
    pub async fn delete_upload(&self, upload_id: &str, owner_id: &str) -> UploadResult<()> {
        let filename = self.resolve_filename(upload_id, owner_id);
        let path = self.layout.file_path(owner_id, &filename)?;
        let marked = self.mark_deleting(&path);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.erase(&marked);
                counter!(m::DELETES_TOTAL, "outcome" => "deleted").increment(1);
                info!(owner_id, upload_id, "Deleted {:?}", path);
                Ok(())
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                self.erase(&marked);
                counter!(m::DELETES_TOTAL, "outcome" => "not_found").increment(1);
                Err(UploadError::NotFound { path, source })
            }
            Err(source) => {
                self.restore(&marked);
                counter!(m::DELETES_TOTAL, "outcome" => "failed").increment(1);
                warn!("Failed to delete {:?}: {}", path, source);
                Err(UploadError::DeleteFailed { path, source })
            }
        }
    }

    fn mark_deleting(&self, path: &Path) -> Vec<(String, UploadStatus)> {
        let mut index = self.index();
        index
            .values_mut()
            .filter(|record| record.storage_path() == path)
            .map(|record| {
                let prior = std::mem::replace(&mut record.status, UploadStatus::Deleting);
                (record.id.clone(), prior)
            })
            .collect()
    }

    fn erase(&self, marked: &[(String, UploadStatus)]) {
        let mut index = self.index();
        for (id, _) in marked {
            index.remove(id);
        }
        gauge!(m::ACTIVE_UPLOADS).set(index.len() as f64);
    }

    fn restore(&self, marked: &[(String, UploadStatus)]) {
        let mut index = self.index();
        for (id, prior) in marked {
            if let Some(record) = index.get_mut(id) {
                record.status = *prior;
            }
        }
    }

    // ── Policy / cleanup ────────────────────────────────────────────

    /// Check a size and filename against the policy without touching disk.
    pub fn validate_file(&self, size: u64, filename: &str) -> Result<(), ValidationError> {
        self.policy.validate(size, filename)
    }

    /// Remove every file under the storage root, across all owners, whose
    /// modification time is strictly older than `max_age`.
    ///
    /// Stops at the first failure with [`UploadError::CleanupFailed`].  The
    /// index is left as is.
    pub async fn cleanup_old_uploads(&self, max_age: Duration) -> UploadResult<CleanupReport> {
        let report = sweep::sweep(self.layout.root(), max_age, SystemTime::now()).await?;
        counter!(m::CLEANUP_REMOVED_TOTAL).increment(report.removed.len() as u64);
        info!(
            "Cleanup removed {} file(s), {} bytes older than {}s",
            report.removed.len(),
            report.bytes_reclaimed,
            max_age.as_secs()
        );
        Ok(report)
    }

    // ── Index inspection ────────────────────────────────────────────

    /// The indexed record with `id`, if any.
    pub fn active(&self, id: &str) -> Option<UploadRecord> {
        self.index().get(id).cloned()
    }

    /// All indexed records, oldest first.
    pub fn active_uploads(&self) -> Vec<UploadRecord> {
        let mut records: Vec<_> = self.index().values().cloned().collect();
        records.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    /// Evict and return every record left [`UploadStatus::Failed`] by ingest.
    pub fn reconcile_failed(&self) -> Vec<UploadRecord> {
        let mut index = self.index();
        let failed: Vec<String> = index
            .values()
            .filter(|record| record.status == UploadStatus::Failed)
            .map(|record| record.id.clone())
            .collect();
        let evicted: Vec<UploadRecord> = failed.iter().filter_map(|id| index.remove(id)).collect();
        gauge!(m::ACTIVE_UPLOADS).set(index.len() as f64);
        evicted
    }

    /// Map an index id to its filename when it belongs to `owner_id`;
    /// otherwise the id is taken to be a filename.
    fn resolve_filename(&self, upload_id: &str, owner_id: &str) -> String {
        self.index()
            .get(upload_id)
            .filter(|record| record.owner_id == owner_id)
            .map(|record| record.filename.clone())
            .unwrap_or_else(|| upload_id.to_string())
    }

    /// Filename -> id of the newest completed index entry per file.
    fn tracked_ids(&self, owner_id: &str) -> HashMap<String, String> {
        let index = self.index();
        let mut newest: HashMap<String, &UploadRecord> = HashMap::new();
        for record in index.values() {
            if record.owner_id != owner_id || record.status != UploadStatus::Completed {
                continue;
            }
            newest
                .entry(record.filename.clone())
                .and_modify(|current| {
                    if record.uploaded_at > current.uploaded_at {
                        *current = record;
                    }
                })
                .or_insert(record);
        }
        newest
            .into_iter()
            .map(|(filename, record)| (filename, record.id.clone()))
            .collect()
    }
}

async fn copy_and_sync<R>(payload: &mut R, file: &mut tokio::fs::File) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let written = tokio::io::copy(payload, file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

// ── Tests ───────────────────────────────────────────────────────────
