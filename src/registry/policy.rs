//! Size and type policy.
//!
//! The type check is a plain case-sensitive suffix match against the
//! allowed list, not an extension parse: `evidence.jpg` passes and so does
//! `xyzjpg`.

use crate::config::PolicyConfig;
use crate::errors::ValidationError;

/// Limits applied to every stored upload.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        PolicyConfig::default().into()
    }
}

impl From<PolicyConfig> for UploadPolicy {
    fn from(config: PolicyConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_types: config.allowed_types,
        }
    }
}

impl UploadPolicy {
    /// Check `size` then `filename` against the policy. Has no side effects.
    pub fn validate(&self, size: u64, filename: &str) -> Result<(), ValidationError> {
        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        if self
            .allowed_types
            .iter()
            .any(|allowed| filename.ends_with(allowed.as_str()))
        {
            return Ok(());
        }

        Err(ValidationError::TypeNotAllowed {
            filename: filename.to_string(),
        })
    }
}
