use bytes::Bytes;
use mime::Mime;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::{debug, warn};

use super::{DEFAULT_UPLOAD_HOST, NO_SUCH_DOMAIN, UPLOAD_USER_AGENT};
use crate::http::HttpClient;
use crate::key::StorageKey;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("qiniu upload request to {host} failed: {source}")]
    Transport {
        host: String,
        attempts: u8,
        #[source]
        source: reqwest::Error,
    },

    #[error("qiniu upload failed: {status} {body} (host={host})")]
    Rejected {
        status: u16,
        body: String,
        host: String,
        attempts: u8,
    },

    #[error("invalid content type {mime}: {source}")]
    InvalidMime {
        mime: String,
        #[source]
        source: reqwest::Error,
    },
}

impl UploadError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Rejected { status, .. } => Some(*status),
            UploadError::Transport { .. } | UploadError::InvalidMime { .. } => None,
        }
    }

    /// Number of POSTs made before giving up; 2 once the fallback was tried
    pub fn attempts(&self) -> u8 {
        match self {
            UploadError::Transport { attempts, .. } | UploadError::Rejected { attempts, .. } => {
                *attempts
            }
            UploadError::InvalidMime { .. } => 0,
        }
    }
}

/// Raw result of one multipart POST
#[derive(Debug, Clone)]
pub struct UploadResponse {
    pub host: String,
    pub status: u16,
    pub body: String,
    /// 1 for a direct success, 2 when the fallback host answered
    pub attempts: u8,
}

impl UploadResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The upstream reported the resolved upload host as unknown
    pub fn is_unknown_host(&self) -> bool {
        !self.is_success() && self.body.contains(NO_SUCH_DOMAIN)
    }

    fn into_result(self) -> Result<Self, UploadError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(UploadError::Rejected {
                status: self.status,
                body: self.body,
                host: self.host,
                attempts: self.attempts,
            })
        }
    }
}

/// One object to store: key, final bytes and media type
#[derive(Debug, Clone)]
pub struct UploadObject {
    pub key: StorageKey,
    pub bytes: Bytes,
    pub mime: Mime,
}

/// Multipart form uploader with a single default-host fallback
#[derive(Debug, Clone)]
pub struct Uploader {
    http: HttpClient,
    scheme: String,
    fallback_host: String,
}

impl Uploader {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            scheme: "https".to_string(),
            fallback_host: DEFAULT_UPLOAD_HOST.to_string(),
        }
    }

    /// Use plain HTTP, for local test servers
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_fallback_host(mut self, host: impl Into<String>) -> Self {
        self.fallback_host = host.into();
        self
    }

    /// Upload to `host`, retrying once against the fallback host when the
    /// first response says the host does not exist
    pub async fn upload(
        &self,
        host: &str,
        token: &str,
        object: &UploadObject,
    ) -> Result<UploadResponse, UploadError> {
        let first = self.upload_once(host, token, object).await?;

        if !first.is_unknown_host() {
            return first.into_result();
        }

        warn!(
            host,
            fallback = %self.fallback_host,
            status = first.status,
            "Upload host unknown upstream, retrying against fallback host"
        );

        self.send(&self.fallback_host, token, object, 2)
            .await?
            .into_result()
    }

    /// Single multipart POST; only transport failures are errors here
    pub async fn upload_once(
        &self,
        host: &str,
        token: &str,
        object: &UploadObject,
    ) -> Result<UploadResponse, UploadError> {
        self.send(host, token, object, 1).await
    }

    async fn send(
        &self,
        host: &str,
        token: &str,
        object: &UploadObject,
        attempt: u8,
    ) -> Result<UploadResponse, UploadError> {
        let transport = |source: reqwest::Error| UploadError::Transport {
            host: host.to_string(),
            attempts: attempt,
            source,
        };

        let file = Part::stream_with_length(object.bytes.clone(), object.bytes.len() as u64)
            .file_name(object.key.to_string())
            .mime_str(object.mime.as_ref())
            .map_err(|source| UploadError::InvalidMime {
                mime: object.mime.to_string(),
                source,
            })?;

        let form = Form::new()
            .text("token", token.to_string())
            .text("key", object.key.to_string())
            .part("file", file);

        let url = format!("{}://{}/", self.scheme, host);
        debug!(%url, key = %object.key, size = object.bytes.len(), attempt, "Uploading");

        let response = self
            .http
            .post_upload(&url)
            .header(reqwest::header::USER_AGENT, UPLOAD_USER_AGENT)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;

        Ok(UploadResponse {
            host: host.to_string(),
            status,
            body,
            attempts: attempt,
        })
    }
}
