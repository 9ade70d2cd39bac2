//! Operations exposed to the presentation layer.
//!
//! [`App`] pairs an [`IdentityProvider`] with an [`UploadRegistry`]: calls
//! that act on "my" uploads resolve the current user id first, everything
//! else passes straight through.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::config::Config;
use crate::errors::{UploadResult, ValidationError};
use crate::identity::local::LocalIdentityProvider;
use crate::identity::IdentityProvider;
use crate::registry::{CleanupReport, UploadRecord, UploadRegistry};

#[derive(Clone)]
pub struct App {
    pub identity: Arc<dyn IdentityProvider>,
    pub registry: Arc<UploadRegistry>,
}

impl App {
    pub fn new(identity: Arc<dyn IdentityProvider>, registry: Arc<UploadRegistry>) -> Self {
        Self { identity, registry }
    }

    /// Build the file-backed identity provider and the registry from config.
    pub fn from_config(config: &Config) -> UploadResult<Self> {
        let identity = LocalIdentityProvider::new(config.identity_path()?);
        let registry = UploadRegistry::from_config(config)?;
        Ok(Self::new(Arc::new(identity), Arc::new(registry)))
    }

    /// Store `data` as `filename` for the current user.
    pub async fn upload(&self, filename: &str, data: Bytes) -> UploadResult<UploadRecord> {
        let owner_id = self.identity.resolve_user_id().await?;
        self.registry.ingest_bytes(&owner_id, filename, data).await
    }

    /// Stream `reader` into storage as `filename` for the current user.
    pub async fn upload_reader<R>(&self, filename: &str, reader: R) -> UploadResult<UploadRecord>
    where
        R: AsyncRead + Unpin,
    {
        let owner_id = self.identity.resolve_user_id().await?;
        self.registry.ingest(&owner_id, filename, reader).await
    }

    pub async fn list(&self, owner_id: &str) -> UploadResult<Vec<UploadRecord>> {
        self.registry.list_uploads(owner_id).await
    }

    /// List the current user's uploads.
    pub async fn list_mine(&self) -> UploadResult<Vec<UploadRecord>> {
        let owner_id = self.identity.resolve_user_id().await?;
        self.registry.list_uploads(&owner_id).await
    }

    pub async fn delete(&self, upload_id: &str, owner_id: &str) -> UploadResult<()> {
        self.registry.delete_upload(upload_id, owner_id).await
    }

    pub fn validate(&self, size: u64, filename: &str) -> Result<(), ValidationError> {
        self.registry.validate_file(size, filename)
    }

    pub async fn cleanup(&self, max_age: Duration) -> UploadResult<CleanupReport> {
        self.registry.cleanup_old_uploads(max_age).await
    }

    /// Fetch one of the current user's uploads.
    pub async fn get(&self, upload_id: &str) -> UploadResult<UploadRecord> {
        let owner_id = self.identity.resolve_user_id().await?;
        self.registry.get_upload(upload_id, &owner_id).await
    }

    pub async fn username(&self) -> UploadResult<String> {
        Ok(self.identity.username().await?)
    }

    pub async fn set_username(&self, username: &str) -> UploadResult<()> {
        Ok(self.identity.set_username(username).await?)
    }

    pub async fn user_id(&self) -> UploadResult<String> {
        Ok(self.identity.resolve_user_id().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::memory::MemoryIdentityProvider;
    use crate::registry::{UploadPolicy, UploadStatus};

    fn test_app() -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let registry = UploadRegistry::new(dir.path().join("uploads"), UploadPolicy::default())
            .expect("failed to create registry");
        let identity = MemoryIdentityProvider::with_user("alice", "u1");
        (dir, App::new(Arc::new(identity), Arc::new(registry)))
    }

    #[tokio::test]
    async fn test_upload_uses_current_user() {
        let (_dir, app) = test_app();

        let record = app.upload("report.pdf", Bytes::from("abc")).await.unwrap();
        assert_eq!(record.owner_id, "u1");
        assert_eq!(record.status, UploadStatus::Completed);

        let mine = app.list_mine().await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(app.list("u1").await.unwrap(), mine);

        let fetched = app.get(&record.id).await.unwrap();
        assert_eq!(fetched.filename, "report.pdf");
        assert_eq!(fetched.size_bytes, 3);

        app.delete(&record.id, "u1").await.unwrap();
        assert!(app.list_mine().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejected_type() {
        let (_dir, app) = test_app();
        assert!(app.validate(3, "malware.exe").is_err());

        let err = app.upload("malware.exe", Bytes::from("abc")).await.unwrap_err();
        assert_eq!(err.code(), "ValidationFailed");
        assert!(app.list_mine().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identity_passthroughs() {
        let (_dir, app) = test_app();
        assert_eq!(app.username().await.unwrap(), "alice");
        assert_eq!(app.user_id().await.unwrap(), "u1");

        app.set_username("bob").await.unwrap();
        assert_eq!(app.username().await.unwrap(), "bob");

        let err = app.set_username("").await.unwrap_err();
        assert_eq!(err.code(), "EmptyUsername");
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root_dir = Some(dir.path().join("store"));
        config.identity.path = Some(dir.path().join("id.json"));

        let app = App::from_config(&config).unwrap();
        let record = app.upload("scan.png", Bytes::from("png")).await.unwrap();

        let user_id = app.user_id().await.unwrap();
        assert_eq!(
            record.storage_path(),
            dir.path().join("store").join(&user_id).join("scan.png")
        );
        assert!(dir.path().join("id.json").exists());
    }

    #[tokio::test]
    async fn test_upload_reader_streams_file() {
        let (dir, app) = test_app();
        let source = dir.path().join("scan.png");
        std::fs::write(&source, vec![7u8; 64 * 1024]).unwrap();

        let file = tokio::fs::File::open(&source).await.unwrap();
        let record = app.upload_reader("scan.png", file).await.unwrap();

        assert_eq!(record.size_bytes, 64 * 1024);
        assert_eq!(record.owner_id(), "u1");
        assert_eq!(
            std::fs::read(record.storage_path()).unwrap(),
            std::fs::read(&source).unwrap()
        );
    }
}
