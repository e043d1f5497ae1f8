//! Configuration management for imgup
//!
//! Settings are layered:
//! 1. Default values (embedded in structs)
//! 2. JSON configuration file (`config.json`)
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use imgup::config::UploadConfig;
//!
//! let config = UploadConfig::load(None).expect("Failed to load configuration");
//! println!("Uploading into bucket: {}", config.bucket);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `IMGUP__<KEY>`, for example
//! `IMGUP__USER_TOKEN=...` or `IMGUP__ENABLE_WEBP=true`.
//!
//! # Configuration File
//!
//! `--config` wins, then the `IMGUP_CONFIG` environment variable, then
//! `config.json` next to the executable, then `config.json` in the working
//! directory.

mod models;
mod sources;
mod validation;

pub use models::{DEFAULT_BUCKET, DEFAULT_TOKEN_URL, DEFAULT_WEBP_QUALITY, UploadConfig};
pub use sources::{CONFIG_ENV_VAR, CONFIG_FILE_NAME};
pub use validation::ValidationError;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("找不到config.json，请在同目录创建")]
    Missing(PathBuf),

    #[error("config.json格式错误: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error(transparent)]
    ValidationError(#[from] ValidationError),
}

impl UploadConfig {
    /// Locate, load and validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No configuration file exists at the resolved location
    /// - The file is not valid JSON or a value has the wrong type
    /// - `user_token` is blank or another field fails validation
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = sources::locate(explicit);
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let mut config = sources::load_from_sources(path)?;
        validation::validate(&mut config)?;
        Ok(config)
    }
}
