//! On-disk layout of the storage root.
//!
//! Uploads live at `<root>/<owner_id>/<filename>`.  In-flight writes go to
//! `<root>/.tmp/` so a half-written payload never appears at its final path.
//!
//! Owner ids and filenames are used as single path segments.  Anything that
//! would add a directory level or climb out of the root is rejected.

use std::path::{Component, Path, PathBuf};

use crate::errors::{UploadError, UploadResult};

/// Name of the directory holding in-flight writes.
pub const TMP_DIR: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// `<root>/<owner_id>`, after checking the owner id.
    pub fn owner_dir(&self, owner_id: &str) -> UploadResult<PathBuf> {
        check_segment(owner_id)?;
        if owner_id == TMP_DIR {
            return Err(UploadError::InvalidName {
                name: owner_id.to_string(),
            });
        }
        Ok(self.root.join(owner_id))
    }

    /// `<root>/<owner_id>/<filename>`, after checking both segments.
    pub fn file_path(&self, owner_id: &str, filename: &str) -> UploadResult<PathBuf> {
        let dir = self.owner_dir(owner_id)?;
        check_segment(filename)?;
        Ok(dir.join(filename))
    }
}

/// Accept exactly one normal path component.
fn check_segment(name: &str) -> UploadResult<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    );
    if single_normal && !name.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(UploadError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_joins_owner_and_name() {
        let layout = StorageLayout::new("/data");
        assert_eq!(
            layout.file_path("u1", "report.pdf").unwrap(),
            PathBuf::from("/data/u1/report.pdf")
        );
    }

    #[test]
    fn test_rejects_traversal_and_nesting() {
        let layout = StorageLayout::new("/data");
        for bad in ["", ".", "..", "../x.pdf", "a/b.pdf", "/etc/passwd", "a\\b.pdf", "./a.pdf"] {
            assert!(
                matches!(
                    layout.file_path("u1", bad),
                    Err(UploadError::InvalidName { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
        assert!(layout.owner_dir("..").is_err());
        assert!(layout.owner_dir("").is_err());
    }

    #[test]
    fn test_tmp_dir_is_reserved() {
        let layout = StorageLayout::new("/data");
        assert!(layout.owner_dir(TMP_DIR).is_err());
        assert_eq!(layout.tmp_dir(), PathBuf::from("/data/.tmp"));
    }

    #[test]
    fn test_dotted_names_are_fine() {
        let layout = StorageLayout::new("/data");
        assert!(layout.file_path("u1", ".hidden.pdf").is_ok());
        assert!(layout.file_path("u1", "a..b.pdf").is_ok());
    }
}
