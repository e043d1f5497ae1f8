//! Logging setup
//!
//! Diagnostics go to stderr so stdout carries only the upload report.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber; `RUST_LOG` overrides `-v`
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
