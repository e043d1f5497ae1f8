//! Qiniu-style storage client
//!
//! - [`TokenClient`] - upload token handshake and upload-host resolution
//! - [`Uploader`] - multipart form upload with one default-host fallback

mod token;
mod upload;

pub use token::{AuthError, TokenClient, access_key, clean_host};
pub use upload::{UploadError, UploadObject, UploadResponse, Uploader};

/// Upload host used when resolution fails or is inconclusive
pub const DEFAULT_UPLOAD_HOST: &str = "upload-z2.qiniup.com";

pub const DEFAULT_QUERY_URL: &str = "https://api.qiniu.com/v4/query";

/// Body fragment that triggers the fallback upload
pub const NO_SUCH_DOMAIN: &str = "no such domain";

pub const UPLOAD_USER_AGENT: &str = "QiniuDart";
