//! Error types for the download module.
//!
//! This module defines structured errors for probe and transfer operations,
//! providing context-rich error messages for the failure log.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while probing or transferring a single unit.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body failed while it was being streamed.
    #[error("stream error downloading {url}: {source}")]
    Stream {
        /// The URL whose body failed.
        url: String,
        /// The underlying read error.
        #[source]
        source: std::io::Error,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The body ended before the announced content length was received.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Download path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a body stream error.
    pub fn stream(url: impl Into<String>, source: std::io::Error) -> Self {
        Self::Stream {
            url: url.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }
}

// Note: no `From<reqwest::Error>` / `From<std::io::Error>` here. Every variant
// needs the url or path the source error does not carry, so callers go through
// the constructors above.

/// Errors returned synchronously by [`DownloadEngine`](super::DownloadEngine) controls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The operation is not valid while a run is in progress.
    #[error("invalid engine state: {operation} is not allowed while a run is in progress")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
    },

    /// `start()` was called with no units in the batch.
    #[error("cannot start an empty batch")]
    EmptyBatch,

    /// Configured chunk size is outside the supported range.
    #[error("invalid chunk size {value}: must be between 1 and {max}")]
    InvalidChunkSize {
        /// The rejected value.
        value: usize,
        /// The maximum supported value.
        max: usize,
    },
}

impl EngineError {
    pub(crate) fn busy(operation: &'static str) -> Self {
        Self::InvalidState { operation }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/video.mp4");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/video.mp4"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/video.mp4", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/video.mp4"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/test.mp4"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/test.mp4"), "Expected path in: {msg}");
    }

    #[test]
    fn test_download_error_integrity_display() {
        let error = DownloadError::integrity("/tmp/clip.webm", 10_000, 4096);
        let msg = error.to_string();
        assert!(msg.contains("10000"), "Expected expected size in: {msg}");
        assert!(msg.contains("4096"), "Expected actual size in: {msg}");
    }

    #[test]
    fn test_engine_error_invalid_state_names_operation() {
        let error = EngineError::busy("start");
        assert_eq!(
            error.to_string(),
            "invalid engine state: start is not allowed while a run is in progress"
        );
    }
}
