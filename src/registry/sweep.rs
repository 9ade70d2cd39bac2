//! Age-based cleanup of the storage tree.
//!
//! The sweep walks every owner directory (and anything nested below it) in
//! lexicographic order and removes regular files whose modification time is
//! strictly older than the cutoff.  Directories are descended into but never
//! removed.  The walk stops at the first directory it cannot read or the
//! first file it cannot remove; everything after that point is left alone.
//!
//! `<root>/.tmp` holds the temp files of ingests in progress.  Entries there
//! are only removed once they are older than [`IN_FLIGHT_GRACE`] as well, so
//! a short-cutoff sweep cannot pull a temp file out from under a live write
//! while orphans left by a crash are still reclaimed.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, warn};

use super::layout::TMP_DIR;
use crate::errors::{UploadError, UploadResult};

/// Minimum age of a file under `<root>/.tmp` before a sweep removes it.
pub const IN_FLIGHT_GRACE: Duration = Duration::from_secs(3600);

/// What a completed sweep removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Removed files, in traversal order.
    pub removed: Vec<PathBuf>,
    pub bytes_reclaimed: u64,
}

pub(crate) async fn sweep(
    root: &Path,
    max_age: Duration,
    now: SystemTime,
) -> UploadResult<CleanupReport> {
    sweep_with(root, max_age, now, |path: PathBuf| tokio::fs::remove_file(path)).await
}

/// [`sweep`] with the file removal step supplied by the caller.
pub(crate) async fn sweep_with<F, Fut>(
    root: &Path,
    max_age: Duration,
    now: SystemTime,
    mut remove: F,
) -> UploadResult<CleanupReport>
where
    F: FnMut(PathBuf) -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let tmp_dir = root.join(TMP_DIR);
    let mut report = CleanupReport::default();
    let mut stack = vec![(read_sorted(root).await?.into_iter(), max_age)];

    while let Some((entries, cutoff)) = stack.last_mut() {
        let cutoff = *cutoff;
        let Some(path) = entries.next() else {
            stack.pop();
            continue;
        };

        // symlink_metadata: links are treated as files and never followed.
        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {:?} during cleanup: {}", path, e);
                continue;
            }
        };

        if metadata.is_dir() {
            let child_cutoff = if path == tmp_dir {
                cutoff.max(IN_FLIGHT_GRACE)
            } else {
                cutoff
            };
            stack.push((read_sorted(&path).await?.into_iter(), child_cutoff));
            continue;
        }

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!("Skipping {:?} during cleanup: {}", path, e);
                continue;
            }
        };
        // Timestamps in the future count as age zero.
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= cutoff {
            continue;
        }

        remove(path.clone())
            .await
            .map_err(|source| UploadError::CleanupFailed {
                path: path.clone(),
                source,
            })?;
        debug!("Removed {:?} (age {}s)", path, age.as_secs());
        report.bytes_reclaimed += metadata.len();
        report.removed.push(path);
    }

    Ok(report)
}

async fn read_sorted(dir: &Path) -> UploadResult<Vec<PathBuf>> {
    let failed = |source: std::io::Error| UploadError::CleanupFailed {
        path: dir.to_path_buf(),
        source,
    };
    let mut reader = tokio::fs::read_dir(dir).await.map_err(failed)?;
    let mut paths = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(failed)? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_aged(path: &Path, contents: &[u8], age: Duration) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_removes_only_older_entries() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("u1/old.pdf");
        let fresh = dir.path().join("u1/fresh.pdf");
        write_aged(&old, b"12345", 2 * HOUR);
        write_aged(&fresh, b"x", Duration::ZERO);

        let report = sweep(dir.path(), HOUR, SystemTime::now()).await.unwrap();

        assert_eq!(report.removed, vec![old.clone()]);
        assert_eq!(report.bytes_reclaimed, 5);
        assert!(!old.exists());
        assert!(fresh.exists());
        // Owner directories survive even when emptied.
        assert!(dir.path().join("u1").is_dir());
    }

    #[tokio::test]
    async fn test_sweeps_across_owners_and_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("u1/a.png");
        let b = dir.path().join("u2/b.png");
        let nested = dir.path().join("u2/deeper/c.png");
        for path in [&a, &b, &nested] {
            write_aged(path, b"data", 3 * HOUR);
        }

        let report = sweep(dir.path(), HOUR, SystemTime::now()).await.unwrap();

        assert_eq!(report.removed, vec![a.clone(), b.clone(), nested.clone()]);
        assert!(!a.exists() && !b.exists() && !nested.exists());
    }

    #[tokio::test]
    async fn test_age_boundary_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u1/edge.jpg");
        write_aged(&path, b"e", Duration::ZERO);
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        // Exactly max_age old: kept.
        let report = sweep(dir.path(), HOUR, modified + HOUR).await.unwrap();
        assert!(report.removed.is_empty());
        assert!(path.exists());

        let report = sweep(dir.path(), HOUR, modified + HOUR + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(report.removed, vec![path]);
    }

    #[tokio::test]
    async fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = sweep(&dir.path().join("nope"), HOUR, SystemTime::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CleanupFailed");
    }

    #[tokio::test]
    async fn test_first_failure_abandons_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let earlier = dir.path().join("a-owner/earlier.pdf");
        let stuck = dir.path().join("a-owner/stuck.pdf");
        let later = dir.path().join("b-owner/later.pdf");
        for path in [&earlier, &stuck, &later] {
            write_aged(path, b"x", 2 * HOUR);
        }

        let failing = stuck.clone();
        let err = sweep_with(dir.path(), HOUR, SystemTime::now(), move |path: PathBuf| {
            let fail = path == failing;
            async move {
                if fail {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        "file is busy",
                    ))
                } else {
                    tokio::fs::remove_file(path).await
                }
            }
        })
        .await
        .unwrap_err();

        match err {
            UploadError::CleanupFailed { path, .. } => assert_eq!(path, stuck),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!earlier.exists(), "entries before the failure are removed");
        assert!(stuck.exists());
        assert!(later.exists(), "entries after the failure must be left in place");
    }

    #[tokio::test]
    async fn test_in_flight_temp_files_get_grace() {
        let dir = tempfile::tempdir().unwrap();
        let in_flight = dir.path().join(TMP_DIR).join("upload-live");
        let orphan = dir.path().join(TMP_DIR).join("upload-orphan");
        let stored = dir.path().join("u1/fresh.pdf");
        write_aged(&in_flight, b"partial", Duration::ZERO);
        write_aged(&orphan, b"stale", 2 * IN_FLIGHT_GRACE);
        write_aged(&stored, b"f", Duration::ZERO);

        let later = SystemTime::now() + Duration::from_secs(5);
        let report = sweep(dir.path(), Duration::ZERO, later).await.unwrap();

        assert_eq!(report.removed, vec![orphan.clone(), stored.clone()]);
        assert!(in_flight.exists());
        assert!(!orphan.exists());
        assert!(!stored.exists());
    }
}
