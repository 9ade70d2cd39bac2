//! Configuration loading and types for Uploadkeeper.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct.  Every section has defaults, so an empty file (or
//! no file at all) yields a working setup rooted in the user's home
//! directory.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::errors::IdentityError;

/// Directory under the user's home that holds all Uploadkeeper state.
pub const APP_DIR: &str = ".uploadkeeper";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Where uploads are stored.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Size/type policy applied after every write.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Identity document settings.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Upload storage configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    /// Root directory for all owners. Defaults to
    /// `<home>/.uploadkeeper/storage/uploads`.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
}

/// Upload policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Maximum stored size in bytes (default 10 MiB).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Filename suffixes accepted by validation.
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

/// Identity document configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IdentityConfig {
    /// Path of the JSON identity document. Defaults to
    /// `<home>/.uploadkeeper/user-config.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Install the Prometheus recorder and count registry operations.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

impl Config {
    /// Resolve the storage root, falling back to the home directory layout.
    pub fn storage_root(&self) -> Result<PathBuf, IdentityError> {
        match &self.storage.root_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(home_dir()?.join(APP_DIR).join("storage").join("uploads")),
        }
    }

    /// Resolve the identity document path.
    pub fn identity_path(&self) -> Result<PathBuf, IdentityError> {
        match &self.identity.path {
            Some(path) => Ok(path.clone()),
            None => Ok(home_dir()?.join(APP_DIR).join("user-config.json")),
        }
    }
}

/// The current user's home directory.
pub fn home_dir() -> Result<PathBuf, IdentityError> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| std::env::var_os(key))
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or(IdentityError::HomeDirUnavailable)
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_allowed_types() -> Vec<String> {
    vec!["jpg".to_string(), "png".to_string(), "pdf".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
