use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to stage encoder input {}: {source}", path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {program} (install cwebp or set enable_webp=false): {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("encoder produced no readable output {}: {source}", path.display())]
    MissingOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder failed: {0}")]
    Other(String),
}

/// Converts arbitrary image bytes into WebP
///
/// The pipeline only sees bytes in and bytes out, so tests can swap in a fake
/// without an encoder binary on the machine.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// `quality` is already clamped to 1..=100
    async fn encode(&self, input: Bytes, quality: u8) -> Result<Bytes, TranscodeError>;
}
