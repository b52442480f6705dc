//! Logging setup
//!
//! Logs go to stderr and to a daily-rolling file in the configured log
//! directory.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "wipecert.log";

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Initialize logging with file output.
///
/// Returns a guard that must be held for the lifetime of the application
/// to ensure logs are flushed.
pub fn init_logging(log_dir: &Path, debug: bool) -> WorkerGuard {
    // Ensure log directory exists
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(debug)
                .with_ansi(cfg!(feature = "color-output")),
        )
        .try_init();

    match result {
        Ok(()) => tracing::debug!(log_dir = %log_dir.display(), "Logging initialized"),
        Err(e) => eprintln!("Logging already initialized: {}", e),
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(false), "info");
        assert_eq!(default_filter(true), "debug");
    }

    #[test]
    fn test_init_creates_log_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_dir = dir.path().join("nested").join("logs");

        let _guard = init_logging(&log_dir, false);
        assert!(log_dir.is_dir());
    }
}
