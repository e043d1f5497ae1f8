//! Upload pipeline orchestration
//!
//! Drives one run through its stages strictly in order:
//!
//! ```text
//! Acquiring -> [Transcoding] -> Hashing -> AuthTokenFetch -> HostResolve
//!           -> Uploading -> [RetryUploading] -> Success | Failed
//! ```
//!
//! Any stage error ends the run as [`Stage::Failed`]; the only retry is the
//! uploader's single default-host fallback.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::acquire::Acquirer;
use crate::config::UploadConfig;
use crate::error::PipelineError;
use crate::http::HttpClient;
use crate::json::{self, Fields};
use crate::key::{ObjectFormat, StorageKey, derive_key};
use crate::qiniu::{TokenClient, UploadObject, Uploader};
use crate::transcode::{CwebpEncoder, DEFAULT_QUALITY, Encoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Acquiring,
    Transcoding,
    Hashing,
    AuthTokenFetch,
    HostResolve,
    Uploading,
    RetryUploading,
    Success,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Acquiring => "acquiring",
            Stage::Transcoding => "transcoding",
            Stage::Hashing => "hashing",
            Stage::AuthTokenFetch => "auth_token_fetch",
            Stage::HostResolve => "host_resolve",
            Stage::Uploading => "uploading",
            Stage::RetryUploading => "retry_uploading",
            Stage::Success => "success",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Successful run: where the object went and what the service said
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub key: StorageKey,
    pub host: String,
    pub status: u16,
    /// Raw response body from the upload endpoint
    pub body: String,
    pub attempts: u8,
}

impl UploadOutcome {
    /// Console report: success banner followed by the indented response
    pub fn report(&self) -> String {
        format!("上传成功\nresponse_json:\n{}", json::pretty(&self.body))
    }
}

#[derive(bon::Builder)]
pub struct Pipeline {
    acquirer: Acquirer,
    tokens: TokenClient,
    uploader: Uploader,
    #[builder(into)]
    user_token: String,
    #[builder(into)]
    bucket: String,
    /// Present when WebP re-encoding is enabled
    encoder: Option<Arc<dyn Encoder>>,
    #[builder(default = DEFAULT_QUALITY)]
    quality: u8,
}

impl Pipeline {
    /// Wire the production collaborators from loaded settings
    pub fn from_config(config: &UploadConfig, http: HttpClient) -> Self {
        let encoder = config
            .enable_webp
            .then(|| Arc::new(CwebpEncoder::new(config.cwebp_path.clone())) as Arc<dyn Encoder>);

        Pipeline::builder()
            .acquirer(Acquirer::new(http.clone()))
            .tokens(TokenClient::new(http.clone(), config.qiniu_token_url.clone()))
            .uploader(Uploader::new(http))
            .user_token(config.user_token.clone())
            .bucket(config.bucket.clone())
            .maybe_encoder(encoder)
            .quality(config.quality())
            .build()
    }

    /// Upload one path or URL
    pub async fn run(&self, input: &str) -> Result<UploadOutcome, PipelineError> {
        enter(Stage::Idle);

        match self.execute(input).await {
            Ok(outcome) => {
                enter(Stage::Success);
                log_receipt(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                enter(Stage::Failed);
                warn!(
                    code = e.code(),
                    stage = %e.stage(),
                    status = e.status(),
                    error = %e,
                    "Upload failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, input: &str) -> Result<UploadOutcome, PipelineError> {
        enter(Stage::Acquiring);
        let content = self.acquirer.acquire(input).await?;

        let (bytes, format): (Bytes, ObjectFormat) = match &self.encoder {
            Some(encoder) => {
                enter(Stage::Transcoding);
                let original_size = content.bytes.len();
                let encoded = encoder.encode(content.bytes, self.quality).await?;
                debug!(original_size, encoded_size = encoded.len(), quality = self.quality, "Transcoded to webp");
                (encoded, ObjectFormat::webp())
            }
            None => {
                let format = ObjectFormat::passthrough(&content.name, content.content_type.as_ref());
                (content.bytes, format)
            }
        };

        enter(Stage::Hashing);
        let key = derive_key(&bytes, &format.extension);
        debug!(%key, mime = %format.mime, "Derived storage key");

        enter(Stage::AuthTokenFetch);
        let token = self.tokens.fetch_upload_token(&self.user_token).await?;

        enter(Stage::HostResolve);
        let host = self.tokens.resolve_upload_host(&token, &self.bucket).await;
        debug!(%host, "Resolved upload host");

        enter(Stage::Uploading);
        let object = UploadObject {
            key,
            bytes,
            mime: format.mime,
        };
        let uploaded = self.uploader.upload(&host, &token, &object).await;
        let attempts = match &uploaded {
            Ok(response) => response.attempts,
            Err(e) => e.attempts(),
        };
        if attempts > 1 {
            enter(Stage::RetryUploading);
        }
        let response = uploaded?;

        Ok(UploadOutcome {
            key: object.key,
            host: response.host,
            status: response.status,
            body: response.body,
            attempts: response.attempts,
        })
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "Pipeline stage");
}

fn log_receipt(outcome: &UploadOutcome) {
    let fields = Fields::parse(&outcome.body).ok();
    let field = |name| fields.as_ref().and_then(|f| f.str(name)).unwrap_or_default();

    info!(
        key = field("key"),
        hash = field("hash"),
        fsize = fields.as_ref().and_then(|f| f.int("fsize")),
        local_key = %outcome.key,
        md5 = outcome.key.content_hash(),
        host = %outcome.host,
        attempts = outcome.attempts,
        "Upload succeeded"
    );
}
