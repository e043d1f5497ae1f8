use super::models::UploadConfig;
use config::{ConfigError, Environment, File, FileFormat, Map};
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "IMGUP_CONFIG";
pub const CONFIG_FILE_NAME: &str = "config.json";
const ENV_PREFIX: &str = "IMGUP";
const ENV_SEPARATOR: &str = "__";

/// Picks the config file location
///
/// Priority: explicit path, `IMGUP_CONFIG`, `config.json` beside the
/// executable, then `config.json` in the working directory. The last candidate
/// is returned even when it does not exist so the caller can report it.
pub fn locate(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(path) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }

    let beside_exe = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME)));

    match beside_exe {
        Some(path) if path.exists() => path,
        _ => PathBuf::from(CONFIG_FILE_NAME),
    }
}

/// Load configuration from a JSON file plus environment overrides:
/// 1. Defaults (embedded in structs)
/// 2. JSON file
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load_from_sources(config_path: &Path) -> Result<UploadConfig, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    load_with_env(config_path, None)
}

/// Same layering with the environment read from `env` instead of the process
/// when one is given
fn load_with_env(
    config_path: &Path,
    env: Option<Map<String, String>>,
) -> Result<UploadConfig, ConfigError> {
    tracing::debug!("Loading configuration from: {}", config_path.display());

    let config = config::Config::builder()
        .add_source(File::from(config_path).format(FileFormat::Json).required(true))
        // IMGUP__USER_TOKEN -> user_token
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    config.try_deserialize()
}
