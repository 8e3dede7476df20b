//! Logging and tracing configuration
//!
//! Console logging goes to stderr so that command output on stdout stays
//! clean. A run can additionally be logged to `run.log` in a directory of
//! the caller's choosing.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name of the log file written when a log directory is given
pub const LOG_FILE_NAME: &str = "run.log";

/// Default filter for a given `-v` count
fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "flowprobe=info,warn",
        1 => "flowprobe=debug,info",
        _ => "flowprobe=trace,debug",
    }
}

/// Initialize tracing for the CLI
///
/// `RUST_LOG` overrides the verbosity-derived filter. When `log_dir` is set,
/// a file layer without ANSI colors is added; the returned guard must be
/// held until exit so buffered lines are flushed.
pub fn init_cli(verbosity: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Warning: Could not create log directory {}: {}", dir.display(), e);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_by_verbosity() {
        assert_eq!(default_filter(0), "flowprobe=info,warn");
        assert_eq!(default_filter(1), "flowprobe=debug,info");
        assert_eq!(default_filter(5), "flowprobe=trace,debug");
    }
}
