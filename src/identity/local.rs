//! File-backed identity provider.
//!
//! The identity lives in a small pretty-printed JSON document
//! (`{"username": ..., "userId": ...}`).  A missing or empty file means no
//! identity has been created yet.  Writes go through a temp file in the same
//! directory followed by a rename.  Access from this process is serialized by
//! a mutex; concurrent edits by other processes are not guarded against.

use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

use super::{new_user_id, IdentityProvider, UserConfig};
use crate::errors::IdentityError;

pub struct LocalIdentityProvider {
    path: PathBuf,
    /// Last document read or written; `None` until first access.
    cached: Mutex<Option<UserConfig>>,
}

impl LocalIdentityProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forget the cached document so the next call rereads the file.
    pub fn clear_cache(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<UserConfig>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn io_error(&self, source: std::io::Error) -> IdentityError {
        IdentityError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Read the document from disk.
    fn read(&self) -> Result<UserConfig, IdentityError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(UserConfig::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        if contents.trim().is_empty() {
            return Ok(UserConfig::default());
        }
        serde_json::from_str(&contents).map_err(|source| IdentityError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, config: &UserConfig) -> Result<(), IdentityError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;

        let temp = NamedTempFile::new_in(parent).map_err(|e| self.io_error(e))?;
        {
            let mut writer = BufWriter::new(&temp);
            serde_json::to_writer_pretty(&mut writer, config).map_err(|e| self.io_error(e.into()))?;
            writer.flush().map_err(|e| self.io_error(e))?;
        }
        temp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        tracing::debug!("Stored identity document at {:?}", self.path);
        Ok(())
    }

    /// The cached document, loading it on first use.
    fn load<'a>(
        &self,
        cached: &'a mut Option<UserConfig>,
    ) -> Result<&'a mut UserConfig, IdentityError> {
        if cached.is_none() {
            *cached = Some(self.read()?);
        }
        Ok(cached.get_or_insert_with(UserConfig::default))
    }

    fn resolve_user_id_sync(&self) -> Result<String, IdentityError> {
        let mut cached = self.lock();
        let config = self.load(&mut cached)?;
        if config.user_id.is_empty() {
            let mut updated = config.clone();
            updated.user_id = new_user_id();
            self.write(&updated)?;
            tracing::info!("Created new user id {}", updated.user_id);
            *config = updated;
        }
        Ok(config.user_id.clone())
    }

    fn set_username_sync(&self, username: &str) -> Result<(), IdentityError> {
        if username.is_empty() {
            return Err(IdentityError::EmptyUsername);
        }
        let mut cached = self.lock();
        let config = self.load(&mut cached)?;
        let mut updated = config.clone();
        updated.username = username.to_string();
        self.write(&updated)?;
        *config = updated;
        Ok(())
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn resolve_user_id(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>> {
        Box::pin(async move { self.resolve_user_id_sync() })
    }

    fn username(&self) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>> {
        Box::pin(async move {
            let mut cached = self.lock();
            // An empty cached name may be stale; reread before giving up.
            if cached.as_ref().map_or(true, |c| c.username.is_empty()) {
                *cached = Some(self.read()?);
            }
            match cached.as_ref() {
                Some(config) if !config.username.is_empty() => Ok(config.username.clone()),
                _ => Err(IdentityError::NotConfigured { field: "username" }),
            }
        })
    }

    fn set_username(
        &self,
        username: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), IdentityError>> + Send + '_>> {
        let username = username.to_string();
        Box::pin(async move { self.set_username_sync(&username) })
    }

    fn current(&self) -> Pin<Box<dyn Future<Output = Result<UserConfig, IdentityError>> + Send + '_>> {
        Box::pin(async move {
            let config = self.read()?;
            *self.lock() = Some(config.clone());
            Ok(config)
        })
    }
}
