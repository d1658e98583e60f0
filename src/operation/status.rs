//! Operation status values.

use std::fmt;

/// Lifecycle state of a [`TransferOrchestrator`](super::TransferOrchestrator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationStatus {
    /// Created but not started.
    #[default]
    Idle,
    /// The background task is running.
    Working,
    /// The worker's transfer is held.
    Paused,
    /// Finished normally.
    Success,
    /// Finished with an error.
    Failed,
    /// Stopped on request.
    Canceled,
}

impl OperationStatus {
    /// Whether no further transitions can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }

    /// Whether the background task is still alive.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Working | Self::Paused)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Paused => "paused",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_and_active_are_disjoint() {
        for status in [
            OperationStatus::Idle,
            OperationStatus::Working,
            OperationStatus::Paused,
            OperationStatus::Success,
            OperationStatus::Failed,
            OperationStatus::Canceled,
        ] {
            assert!(!(status.is_terminal() && status.is_active()), "{status}");
        }
        assert!(!OperationStatus::Idle.is_terminal());
        assert!(!OperationStatus::Idle.is_active());
    }

    #[test]
    fn test_display_is_lowercase() {
        assert_eq!(OperationStatus::Canceled.to_string(), "canceled");
        assert_eq!(OperationStatus::default().to_string(), "idle");
    }
}
