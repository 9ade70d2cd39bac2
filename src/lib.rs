//! Uploadkeeper library: a local, per-user upload registry.
//!
//! This crate stores uploaded payloads under `<root>/<user id>/<filename>`,
//! tracks the uploads made by this process in an in-memory index, validates
//! them against a size/type policy, and sweeps old files by age.  The user id
//! namespace comes from a pluggable identity provider.

pub mod app;
pub mod config;
pub mod errors;
pub mod identity;
pub mod metrics;
pub mod registry;

pub use app::App;
pub use errors::{IdentityError, UploadError, ValidationError};
pub use registry::{UploadRecord, UploadRegistry, UploadStatus};
