//! Shared HTTP transport
//!
//! One `reqwest::Client` (and its connection pool) is built in `main` and
//! cloned into every component. Dropping the last clone at exit tears it down.

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportInitError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Total timeout for downloads and auth calls
    pub request_timeout: Duration,
    /// Total timeout for the multipart upload
    pub upload_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(60),
            upload_timeout: Duration::from_secs(120),
            max_redirects: 10,
            user_agent: concat!("imgup/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Cloneable handle on the process-wide client
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, TransportInitError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    /// GET with the default request timeout
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url).timeout(self.config.request_timeout)
    }

    /// POST with the longer upload timeout
    pub fn post_upload(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url).timeout(self.config.upload_timeout)
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}
