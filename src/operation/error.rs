//! Error types for background operations.

use thiserror::Error;

use crate::download::EngineError;
use crate::playlist::ResolveError;

/// Errors that end an operation with [`OperationStatus::Failed`](super::OperationStatus::Failed).
#[derive(Debug, Error)]
pub enum OperationError {
    /// Playlist or format lookup failed.
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    /// The download engine rejected a control call.
    #[error("download engine error: {0}")]
    Engine(#[from] EngineError),

    /// The arguments passed to `start` are unusable.
    #[error("invalid operation arguments: {0}")]
    InvalidArgs(String),

    /// The worker panicked.
    #[error("operation task panicked: {0}")]
    Panicked(String),

    /// `start` was called on an operation that already ran.
    #[error("operation was already started")]
    AlreadyStarted,
}

impl OperationError {
    /// Whether this is a resolution timeout, which callers phrase differently.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Resolution(ResolveError::Timeout { .. }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_timeout_is_detected_through_resolution() {
        let error = OperationError::from(ResolveError::Timeout {
            after: Duration::from_secs(30),
        });
        assert!(error.is_timeout());
        assert!(error.to_string().starts_with("resolution failed"));
        assert!(!OperationError::AlreadyStarted.is_timeout());
    }
}
