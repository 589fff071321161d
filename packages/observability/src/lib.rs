//! # Observability
//!
//! Logging setup shared by every Plainflow crate.
//!
//! Library crates only emit `tracing` events. Binaries call
//! [`init`] or [`init_with_config`] once at startup; after that every event
//! is written as one JSON line to a log file, optionally mirrored to stderr.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("plainflow-cli");
//!     tracing::info!("ready");
//! }
//! ```

mod file;
mod json_layer;

pub use file::{default_log_path, FileLogWriter};
pub use json_layer::{JsonLayer, LogEntry};

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every log line.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info"). `RUST_LOG` wins when set.
    pub default_level: String,

    /// Log file path. Defaults to `~/.plainflow/logs/plainflow.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact human-readable logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with a custom configuration.
///
/// Falls back to stderr-only output if the log file cannot be opened.
/// Calling this twice is a no-op for the second call.
pub fn init_with_config(config: LogConfig) {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let log_path = config.log_path.clone().or_else(default_log_path);
    let file_layer = log_path.as_ref().and_then(|path| match FileLogWriter::new(path) {
        Ok(writer) => Some(JsonLayer::new(config.service_name.clone(), writer)),
        Err(err) => {
            eprintln!("observability: cannot open log file {}: {err}", path.display());
            None
        }
    });
    let file_enabled = file_layer.is_some();

    let stderr_layer = if config.also_stderr || !file_enabled {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(file_layer.map(|layer| layer.with_filter(env_filter())))
        .with(stderr_layer.map(|layer| layer.with_filter(env_filter())))
        .try_init();

    if installed.is_ok() {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?log_path,
            "observability initialized"
        );
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn};
