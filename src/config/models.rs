use serde::{Deserialize, Serialize};

use crate::transcode::clamp_quality;

pub const DEFAULT_BUCKET: &str = "chat68";
pub const DEFAULT_TOKEN_URL: &str = "https://chat-go.jwzhd.com/v1/misc/qiniu-token";
pub const DEFAULT_WEBP_QUALITY: i64 = 95;

/// Upload settings read from `config.json`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Bearer token for the auth endpoint (required)
    #[serde(default)]
    pub user_token: String,
    #[serde(default)]
    pub enable_webp: bool,
    /// Raw value from the file; use [`UploadConfig::quality`] for the clamped one
    #[serde(default = "default_webp_quality")]
    pub webp_quality: i64,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_token_url")]
    pub qiniu_token_url: String,
    /// Encoder executable, resolved through `PATH` when not absolute
    #[serde(default = "default_cwebp_path")]
    pub cwebp_path: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            user_token: String::new(),
            enable_webp: false,
            webp_quality: default_webp_quality(),
            bucket: default_bucket(),
            qiniu_token_url: default_token_url(),
            cwebp_path: default_cwebp_path(),
        }
    }
}

impl UploadConfig {
    /// WebP quality with out-of-range values replaced by the default
    pub fn quality(&self) -> u8 {
        clamp_quality(self.webp_quality)
    }
}

fn default_webp_quality() -> i64 {
    DEFAULT_WEBP_QUALITY
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_cwebp_path() -> String {
    "cwebp".to_string()
}
