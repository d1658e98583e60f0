//! Messages carried on an operation's progress channel.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use super::OperationStatus;

/// Receiving half returned by [`TransferOrchestrator::start`](super::TransferOrchestrator::start).
pub type ProgressReceiver = mpsc::UnboundedReceiver<OperationProgress>;

/// A batch of presentation properties changed together.
///
/// Only the fields that are `Some` changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyUpdate {
    /// Human-readable title, e.g. `"(2/10) Some clip"`.
    pub title: Option<String>,
    /// Duration of the current item.
    pub duration: Option<Duration>,
    /// Size in bytes of the current item or batch.
    pub file_size: Option<u64>,
    /// Status text shown instead of a progress figure, e.g. `"Combining..."`.
    pub text: Option<String>,
    /// Whether the percentage is meaningful right now.
    pub reports_progress: Option<bool>,
    /// Formatted speed, e.g. `"1.5 MB/s"`.
    pub speed: Option<String>,
    /// Formatted time left, empty when unknown.
    pub eta: Option<String>,
    /// Bytes transferred so far in the current batch.
    pub progress: Option<u64>,
}

impl PropertyUpdate {
    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the file size.
    #[must_use]
    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    /// Sets the status text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets whether progress is reported.
    #[must_use]
    pub fn with_reports_progress(mut self, reports_progress: bool) -> Self {
        self.reports_progress = Some(reports_progress);
        self
    }

    /// Sets the transfer figures.
    #[must_use]
    pub fn with_transfer(mut self, progress: u64, speed: String, eta: String) -> Self {
        self.progress = Some(progress);
        self.speed = Some(speed);
        self.eta = Some(eta);
        self
    }

    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One message on the progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationProgress {
    /// Overall percentage, `0.0..=100.0`.
    Percentage(f64),
    /// Several properties changed at once.
    Properties(PropertyUpdate),
    /// One item is done and its final file is at this path.
    ItemComplete(PathBuf),
    /// The operation ended. Always the last message.
    Finished {
        /// Terminal status.
        status: OperationStatus,
        /// Single human-readable summary line.
        summary: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_only_named_fields() {
        let update = PropertyUpdate::default()
            .with_text("Combining...")
            .with_reports_progress(false);

        assert_eq!(update.text.as_deref(), Some("Combining..."));
        assert_eq!(update.reports_progress, Some(false));
        assert!(update.title.is_none());
        assert!(update.file_size.is_none());
        assert!(!update.is_empty());
        assert!(PropertyUpdate::default().is_empty());
    }
}
