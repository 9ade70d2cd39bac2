//! Error types for the upload registry and the identity provider.
//!
//! Every variant that comes from a filesystem call keeps the offending
//! path and the underlying [`std::io::Error`] as its source so callers
//! can log or display the full chain.

use std::path::PathBuf;

use thiserror::Error;

/// Policy violations reported by [`crate::registry::UploadPolicy::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The payload is larger than the configured maximum.
    #[error("file size {size} exceeds maximum allowed size: {max}")]
    FileTooLarge { size: u64, max: u64 },

    /// The filename does not end with any allowed type.
    #[error("file type not allowed: {filename}")]
    TypeNotAllowed { filename: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::FileTooLarge { .. } => "FileTooLarge",
            ValidationError::TypeNotAllowed { .. } => "TypeNotAllowed",
        }
    }
}

/// Failures of the identity document.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Neither `HOME` nor `USERPROFILE` is set.
    #[error("could not resolve the user home directory")]
    HomeDirUnavailable,

    #[error("username cannot be empty")]
    EmptyUsername,

    /// The document exists but has no value for the requested field.
    #[error("identity field not configured: {field}")]
    NotConfigured { field: &'static str },

    #[error("identity document I/O failed at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("identity document at {path} is not valid JSON")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl IdentityError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::HomeDirUnavailable => "HomeDirUnavailable",
            IdentityError::EmptyUsername => "EmptyUsername",
            IdentityError::NotConfigured { .. } => "NotConfigured",
            IdentityError::Io { .. } => "IdentityIo",
            IdentityError::Corrupt { .. } => "IdentityCorrupt",
        }
    }
}

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum UploadError {
    /// An owner id or filename is empty, reserved, or not a single path
    /// component.
    #[error("invalid name: {name:?}")]
    InvalidName { name: String },

    /// The destination (owner directory or in-flight file) could not be
    /// created.
    #[error("storage unavailable at {path}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload copy aborted; the partial file has been removed.
    #[error("failed to write file {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The write succeeded but the stored file violates policy. The file is
    /// gone and the indexed record is marked failed.
    #[error("failed to validate upload {id}")]
    ValidationFailed {
        id: String,
        #[source]
        source: ValidationError,
    },

    /// A standalone policy check failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("directory not found: {path}")]
    DirectoryNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload not found: {path}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete file {path}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sweep stopped at the first entry it could not process.
    #[error("cleanup abandoned at {path}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl UploadError {
    /// Stable machine-readable error name.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::InvalidName { .. } => "InvalidName",
            UploadError::StorageUnavailable { .. } => "StorageUnavailable",
            UploadError::WriteFailed { .. } => "WriteFailed",
            UploadError::ValidationFailed { .. } => "ValidationFailed",
            UploadError::Validation(e) => e.code(),
            UploadError::DirectoryNotFound { .. } => "DirectoryNotFound",
            UploadError::NotFound { .. } => "NotFound",
            UploadError::DeleteFailed { .. } => "DeleteFailed",
            UploadError::CleanupFailed { .. } => "CleanupFailed",
            UploadError::Identity(e) => e.code(),
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
