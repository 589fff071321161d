//! Logging bootstrap for Plainflow binaries.

use crate::Paths;

/// Initialize logging for the CLI.
///
/// Writes JSONL to the Plainflow log file. Set `PLAINFLOW_LOG_STDERR=1` to
/// mirror output to stderr.
pub fn init_logging(level: &str, paths: &Paths) {
    let also_stderr = std::env::var("PLAINFLOW_LOG_STDERR")
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    observability::init_with_config(observability::LogConfig {
        service_name: "plainflow".into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}
