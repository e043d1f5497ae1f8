use super::models::UploadConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("config.json里的 user_token 为空")]
    EmptyUserToken,

    #[error("bucket must not be empty")]
    EmptyBucket,

    #[error("Invalid qiniu_token_url '{url}', expected an http:// or https:// URL")]
    InvalidTokenUrl { url: String },
}

/// Validate and tidy the loaded configuration
pub fn validate(config: &mut UploadConfig) -> Result<(), ValidationError> {
    config.user_token = config.user_token.trim().to_string();
    if config.user_token.is_empty() {
        return Err(ValidationError::EmptyUserToken);
    }

    if config.bucket.trim().is_empty() {
        return Err(ValidationError::EmptyBucket);
    }

    let url = config.qiniu_token_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::InvalidTokenUrl {
            url: config.qiniu_token_url.clone(),
        });
    }

    Ok(())
}
