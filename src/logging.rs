//! Tracing subscriber setup for the command-line tool.
//!
//! Console output goes to stderr so it does not interleave with the progress
//! bar's redraws more than necessary. When a log directory is configured, a
//! daily-rotated file log is written as well.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name prefix of the application log.
pub const LOG_FILE_PREFIX: &str = "playlist-dl";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("failed to create log directory {}: {source}", .path.display())]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Keeps the file writer alive; dropping it flushes pending lines.
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Default filter directive for the given flags.
///
/// `quiet` wins over `verbose`; one `-v` means debug, two or more mean trace.
#[must_use]
pub fn default_level(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. The file log, when enabled,
/// always records at least debug detail.
///
/// # Errors
///
/// Returns [`LoggingError`] if the log directory cannot be created or a
/// subscriber is already installed.
pub fn init(level: &str, log_dir: Option<&Path>) -> Result<LoggingGuard, LoggingError> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(file_level(level)));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn file_level(console_level: &str) -> &str {
    if console_level == "trace" { "trace" } else { "debug" }
}
