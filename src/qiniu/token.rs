use thiserror::Error;
use tracing::{debug, warn};

use super::{DEFAULT_QUERY_URL, DEFAULT_UPLOAD_HOST};
use crate::http::HttpClient;
use crate::json::Fields;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("qiniu-token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("qiniu-token http error: {status} {body}")]
    Status { status: u16, body: String },

    #[error("qiniu-token api error: {body}")]
    Rejected { body: String },

    #[error("qiniu-token missing token: {body}")]
    MissingToken { body: String },
}

impl AuthError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Status { status, .. } => Some(*status),
            AuthError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Upload token handshake plus upload-host lookup
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: HttpClient,
    token_url: String,
    query_url: String,
    default_host: String,
}

impl TokenClient {
    pub fn new(http: HttpClient, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            query_url: DEFAULT_QUERY_URL.to_string(),
            default_host: DEFAULT_UPLOAD_HOST.to_string(),
        }
    }

    /// Point host resolution at another query endpoint
    pub fn with_query_url(mut self, query_url: impl Into<String>) -> Self {
        self.query_url = query_url.into();
        self
    }

    /// Host used whenever resolution is inconclusive
    pub fn with_default_host(mut self, host: impl Into<String>) -> Self {
        self.default_host = host.into();
        self
    }

    /// Exchange the user's bearer token for a storage upload token
    ///
    /// Requires a 2xx status and `"code": 1`; the `token` field may be top
    /// level or nested under `data`.
    pub async fn fetch_upload_token(&self, user_token: &str) -> Result<String, AuthError> {
        let response = self
            .http
            .get(&self.token_url)
            .header("token", user_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let Ok(fields) = Fields::parse(&body) else {
            return Err(AuthError::Rejected { body });
        };

        if fields.int("code") != Some(1) {
            return Err(AuthError::Rejected { body });
        }

        match fields.str("token") {
            Some(token) if !token.is_empty() => {
                debug!(access_key = access_key(token), "Upload token issued");
                Ok(token.to_string())
            }
            _ => Err(AuthError::MissingToken { body }),
        }
    }

    /// Best-effort lookup of the upload host for the token's bucket
    ///
    /// Never fails: any problem yields the default host.
    pub async fn resolve_upload_host(&self, upload_token: &str, bucket: &str) -> String {
        let ak = access_key(upload_token);

        match self.query_domain(ak, bucket).await {
            Ok(Some(domain)) => clean_host_or(&domain, &self.default_host),
            Ok(None) => {
                warn!(bucket, "Host query returned no domains, using default host");
                self.default_host.clone()
            }
            Err(reason) => {
                warn!(bucket, %reason, "Host query failed, using default host");
                self.default_host.clone()
            }
        }
    }

    async fn query_domain(&self, ak: &str, bucket: &str) -> Result<Option<String>, String> {
        let response = self
            .http
            .get(&self.query_url)
            .query(&[("ak", ak), ("bucket", bucket)])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        let fields = Fields::parse(&body).map_err(|e| format!("invalid JSON: {}", e))?;

        Ok(fields.first_str_in("domains").map(str::to_string))
    }
}

/// Substring of the upload token before its first `:`
pub fn access_key(upload_token: &str) -> &str {
    upload_token
        .split_once(':')
        .map_or(upload_token, |(ak, _)| ak)
}

/// Reduce a domain or URL to a bare hostname, defaulting when nothing is left
pub fn clean_host(domain_or_url: &str) -> String {
    clean_host_or(domain_or_url, DEFAULT_UPLOAD_HOST)
}

fn clean_host_or(domain_or_url: &str, default_host: &str) -> String {
    let s = domain_or_url.trim();
    let s = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s);
    let host = s.split('/').next().unwrap_or_default();

    if host.is_empty() {
        default_host.to_string()
    } else {
        host.to_string()
    }
}
