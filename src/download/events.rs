//! Lifecycle and progress notifications emitted by a [`DownloadEngine`](super::DownloadEngine).
//!
//! Every subscriber receives its own ordered copy of the stream. Events from
//! the caller's context (`Started`, `Paused`, `Resumed`, `Canceled`) and from
//! the run task go through the same emitter, so a subscriber sees them in the
//! order they happened.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::{DownloadError, TransferUnit};

/// Receiving half handed out by [`DownloadEngine::subscribe`](super::DownloadEngine::subscribe).
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Counters captured when a chunk was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Index of the unit being transferred.
    pub unit_index: usize,
    /// Bytes written to the current unit.
    pub unit_transferred: u64,
    /// Size of the current unit, `0` while unknown.
    pub unit_size: u64,
    /// Bytes written across the whole batch this run.
    pub total_transferred: u64,
    /// Sum of all probed unit sizes.
    pub total_size: u64,
    /// Last sampled speed in bytes per second.
    pub speed: u64,
}

/// How a run ended. Set exactly once per run, right before `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every unit finished.
    Succeeded,
    /// At least one unit reported `FileDownloadFailed`.
    Failed,
    /// `stop()` was called before the run finished.
    Canceled,
}

impl RunOutcome {
    /// Whether the batch can be used as-is.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

/// A tagged engine notification.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A run was started.
    Started,
    /// All units were probed; `total_size` is the sum of known sizes.
    CalculatedTotalFileSize {
        /// Batch size in bytes.
        total_size: u64,
    },
    /// A chunk was written.
    ProgressChanged(ProgressSnapshot),
    /// The transfer loop is now held.
    Paused,
    /// The transfer loop was released.
    Resumed,
    /// A unit received all of its bytes.
    FileDownloadSucceeded(TransferUnit),
    /// A unit failed; the run continues with the next unit.
    FileDownloadFailed {
        /// What went wrong.
        error: Arc<DownloadError>,
        /// The unit as it was when it failed.
        unit: TransferUnit,
    },
    /// A unit is done, successfully or not.
    FileDownloadComplete(TransferUnit),
    /// The run finished without being canceled.
    Completed,
    /// Cancellation was requested.
    Canceled,
    /// The run is over. Always the last event of a run.
    Stopped {
        /// Terminal outcome of the run.
        outcome: RunOutcome,
    },
}

/// Fan-out of engine events to any number of unbounded subscribers.
#[derive(Debug, Default)]
pub(crate) struct EventEmitter {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<EngineEvent>>>,
}

impl EventEmitter {
    pub(crate) fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Sends `event` to every live subscriber and drops the closed ones.
    pub(crate) fn emit(&self, event: EngineEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
