use thiserror::Error;

use crate::acquire::AcquireError;
use crate::pipeline::Stage;
use crate::qiniu::{AuthError, UploadError};
use crate::transcode::TranscodeError;

/// Terminal failure of one upload run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Acquire(AcquireError::FileRead { .. }) => "FILE_READ_ERROR",
            PipelineError::Acquire(_) => "DOWNLOAD_ERROR",
            PipelineError::Transcode(_) => "TRANSCODE_ERROR",
            PipelineError::Auth(_) => "AUTH_ERROR",
            PipelineError::Upload(UploadError::Transport { .. }) => "TRANSPORT_ERROR",
            PipelineError::Upload(UploadError::Rejected { .. }) => "UPLOAD_REJECTED",
            PipelineError::Upload(UploadError::InvalidMime { .. }) => "INVALID_MIME",
        }
    }

    /// HTTP status behind the failure, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            PipelineError::Acquire(e) => e.status(),
            PipelineError::Transcode(_) => None,
            PipelineError::Auth(e) => e.status(),
            PipelineError::Upload(e) => e.status(),
        }
    }

    /// Stage the run was in when it failed
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Acquire(_) => Stage::Acquiring,
            PipelineError::Transcode(_) => Stage::Transcoding,
            PipelineError::Auth(_) => Stage::AuthTokenFetch,
            PipelineError::Upload(e) if e.attempts() > 1 => Stage::RetryUploading,
            PipelineError::Upload(_) => Stage::Uploading,
        }
    }
}
