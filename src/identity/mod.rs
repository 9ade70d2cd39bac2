//! Local user identity.
//!
//! The registry namespaces storage by an opaque user id.  An
//! [`IdentityProvider`] hands that id out (creating it on first use) and
//! keeps a display name next to it.  [`local::LocalIdentityProvider`] is the
//! file-backed implementation; [`memory::MemoryIdentityProvider`] keeps
//! everything in process.

pub mod local;
pub mod memory;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::errors::IdentityError;

/// The persisted identity document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default, rename = "userId")]
    pub user_id: String,
}

/// Source of the current user's id and display name.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Return the persisted user id, generating and persisting a fresh one
    /// if none exists yet.
    fn resolve_user_id(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>>;

    /// Return the stored username.
    fn username(&self) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>>;

    /// Replace the stored username. Empty names are rejected.
    fn set_username(
        &self,
        username: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), IdentityError>> + Send + '_>>;

    /// The full identity document as currently stored.
    fn current(&self) -> Pin<Box<dyn Future<Output = Result<UserConfig, IdentityError>> + Send + '_>>;
}

fn new_user_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
