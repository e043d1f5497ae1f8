//! Source bytes from a local file or an HTTP(S) URL

use bytes::Bytes;
use mime::Mime;
use reqwest::Url;
use std::path::{MAIN_SEPARATOR, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::http::HttpClient;

/// Error bodies from image hosts can be binary or huge; keep messages short
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("download failed: invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("download failed: HTTP {status}: {body}")]
    DownloadStatus { status: u16, body: String },

    #[error("could not read file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AcquireError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AcquireError::DownloadStatus { status, .. } => Some(*status),
            AcquireError::Download(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Original image bytes plus what we learned about them
#[derive(Debug, Clone)]
pub struct Content {
    pub bytes: Bytes,
    /// Last path segment of the file path or URL
    pub name: String,
    /// Media type reported by the source, parameters stripped
    pub content_type: Option<Mime>,
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reads local files and downloads URLs
#[derive(Debug, Clone)]
pub struct Acquirer {
    http: HttpClient,
}

impl Acquirer {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn acquire(&self, input: &str) -> Result<Content, AcquireError> {
        if is_url(input) {
            self.download(input).await
        } else {
            read_file(input).await
        }
    }

    async fn download(&self, input: &str) -> Result<Content, AcquireError> {
        let url = Url::parse(input).map_err(|e| AcquireError::InvalidUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;

        debug!(%url, "Starting download");

        let response = self.http.get(url.as_str()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquireError::DownloadStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(essence);

        let bytes = response.bytes().await?;

        debug!(%url, size = bytes.len(), "Download completed");

        Ok(Content {
            bytes,
            name: url_name(&url),
            content_type,
        })
    }
}

async fn read_file(input: &str) -> Result<Content, AcquireError> {
    let path = PathBuf::from(input);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| AcquireError::FileRead {
            path: path.clone(),
            source,
        })?;

    debug!(path = %path.display(), size = bytes.len(), "Read local file");

    Ok(Content {
        bytes: Bytes::from(bytes),
        name: path_name(input),
        content_type: Some(mime::APPLICATION_OCTET_STREAM),
    })
}

/// `image/png; charset=binary` -> `image/png`
fn essence(header: &str) -> Option<Mime> {
    let parsed: Mime = header.parse().ok()?;
    parsed.essence_str().parse().ok()
}

fn url_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("image")
        .to_string()
}

fn path_name(input: &str) -> String {
    input
        .rsplit(|c: char| c == '/' || c == MAIN_SEPARATOR)
        .next()
        .unwrap_or(input)
        .to_string()
}
