//! In-memory identity provider.
//!
//! Holds the identity document in process with no persistence.  Useful for
//! tests and for embedding the registry where the caller already knows who
//! the user is.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{new_user_id, IdentityProvider, UserConfig};
use crate::errors::IdentityError;

#[derive(Default)]
pub struct MemoryIdentityProvider {
    inner: Mutex<UserConfig>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing identity.
    pub fn with_user(username: &str, user_id: &str) -> Self {
        Self {
            inner: Mutex::new(UserConfig {
                username: username.to_string(),
                user_id: user_id.to_string(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UserConfig> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    fn resolve_user_id(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.user_id.is_empty() {
                inner.user_id = new_user_id();
            }
            Ok(inner.user_id.clone())
        })
    }

    fn username(&self) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock();
            if inner.username.is_empty() {
                return Err(IdentityError::NotConfigured { field: "username" });
            }
            Ok(inner.username.clone())
        })
    }

    fn set_username(
        &self,
        username: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), IdentityError>> + Send + '_>> {
        let username = username.to_string();
        Box::pin(async move {
            if username.is_empty() {
                return Err(IdentityError::EmptyUsername);
            }
            self.lock().username = username;
            Ok(())
        })
    }

    fn current(&self) -> Pin<Box<dyn Future<Output = Result<UserConfig, IdentityError>> + Send + '_>> {
        Box::pin(async move { Ok(self.lock().clone()) })
    }
}
