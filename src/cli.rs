use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use imgup::config::{ConfigError, UploadConfig};
use imgup::error::PipelineError;
use imgup::http::{HttpClient, HttpConfig, TransportInitError};
use imgup::input::normalize_input;
use imgup::pipeline::Pipeline;

const PROMPT: &str = "请输入图片地址(本地路径或URL): ";

#[derive(Parser, Debug)]
#[command(name = "imgup")]
#[command(about = "Upload an image file or URL to Qiniu storage", long_about = None)]
pub struct Cli {
    /// Local path or http(s) URL; prompted for when omitted
    pub input: Option<String>,

    /// Path to config.json
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("未输入图片地址")]
    EmptyInput,

    #[error("failed to read input: {0}")]
    Stdin(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportInitError),

    #[error("上传失败: {0}")]
    Upload(#[from] PipelineError),
}

/// Run one upload and return the success report
pub async fn run(cli: Cli) -> Result<String, CliError> {
    let config = UploadConfig::load(cli.config.as_deref())?;

    let raw = match cli.input {
        Some(input) => input,
        None => prompt_for_input().await?,
    };
    let input = normalize_input(&raw);
    if input.is_empty() {
        return Err(CliError::EmptyInput);
    }

    let http = HttpClient::new(HttpConfig::default())?;
    let pipeline = Pipeline::from_config(&config, http);
    let outcome = pipeline.run(&input).await?;

    Ok(outcome.report())
}

async fn prompt_for_input() -> Result<String, CliError> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(PROMPT.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line)
}
