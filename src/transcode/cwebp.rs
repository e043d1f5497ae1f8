use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use super::traits::{Encoder, TranscodeError};

/// Runs `cwebp -q <quality> <in> -o <out>` on scratch files
#[derive(Debug, Clone)]
pub struct CwebpEncoder {
    program: String,
    scratch_dir: PathBuf,
}

impl CwebpEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Place scratch files somewhere other than the system temp dir
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }
}

#[async_trait]
impl Encoder for CwebpEncoder {
    async fn encode(&self, input: Bytes, quality: u8) -> Result<Bytes, TranscodeError> {
        let scratch = ScratchFiles::new(&self.scratch_dir);

        tokio::fs::write(&scratch.input, &input)
            .await
            .map_err(|source| TranscodeError::Stage {
                path: scratch.input.clone(),
                source,
            })?;

        debug!(program = %self.program, quality, size = input.len(), "Running encoder");

        let output = Command::new(&self.program)
            .arg("-q")
            .arg(quality.to_string())
            .arg(&scratch.input)
            .arg("-o")
            .arg(&scratch.output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let encoded = tokio::fs::read(&scratch.output)
            .await
            .map_err(|source| TranscodeError::MissingOutput {
                path: scratch.output.clone(),
                source,
            })?;

        Ok(Bytes::from(encoded))
    }
}

/// Input/output paths for one encoder run, removed when dropped
///
/// Names carry a fresh UUID so concurrent runs never share files.
struct ScratchFiles {
    input: PathBuf,
    output: PathBuf,
}

impl ScratchFiles {
    fn new(dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            input: dir.join(format!("imgup-{id}.input")),
            output: dir.join(format!("imgup-{id}.webp")),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch file"),
            }
        }
    }
}
