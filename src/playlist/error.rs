//! Error types for playlist and format resolution.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while looking up a playlist or an item's playable format.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Playlist information did not arrive in time.
    #[error("timed out after {}s waiting for playlist information", .after.as_secs())]
    Timeout {
        /// How long we waited.
        after: Duration,
    },

    /// The playlist or item does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// The item exists but has nothing we can download.
    #[error("no playable format for \"{title}\": {reason}")]
    Unavailable {
        /// Item title.
        title: String,
        /// Why nothing matched.
        reason: String,
    },

    /// The playlist manifest could not be read or parsed.
    #[error("invalid manifest {}: {reason}", .path.display())]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// Underlying problem.
        reason: String,
    },
}

impl ResolveError {
    /// Creates an unavailable-format error.
    pub fn unavailable(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            title: title.into(),
            reason: reason.into(),
        }
    }

    /// Creates a manifest error.
    pub fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_includes_seconds() {
        let error = ResolveError::Timeout {
            after: Duration::from_secs(30),
        };
        assert_eq!(
            error.to_string(),
            "timed out after 30s waiting for playlist information"
        );
    }

    #[test]
    fn test_manifest_display_includes_path() {
        let error = ResolveError::manifest("/tmp/list.json", "expected value at line 1");
        let msg = error.to_string();
        assert!(msg.contains("/tmp/list.json"), "Expected path in: {msg}");
        assert!(msg.contains("line 1"), "Expected reason in: {msg}");
    }
}
