//! Background task runner that owns an operation's status and progress channel.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{OperationError, OperationProgress, OperationStatus, ProgressReceiver, PropertyUpdate};

/// Something whose transfer can be held and released.
pub trait Pausable: Send + Sync {
    /// Whether [`pause`](Self::pause) would take effect now.
    fn can_pause(&self) -> bool;
    /// Whether [`resume`](Self::resume) would take effect now.
    fn can_resume(&self) -> bool;
    /// Holds the transfer.
    fn pause(&self);
    /// Releases the transfer.
    fn resume(&self);
}

/// Handle passed to [`OperationWorker::work`] for cancellation checks and progress reports.
#[derive(Debug, Clone)]
pub struct WorkContext {
    cancel: CancellationToken,
    progress: mpsc::UnboundedSender<OperationProgress>,
}

impl WorkContext {
    /// Whether the operation was asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the operation is asked to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Reports the overall percentage.
    pub fn report_percentage(&self, percentage: f64) {
        self.send(OperationProgress::Percentage(percentage));
    }

    /// Reports a batch of property changes.
    pub fn report_properties(&self, update: PropertyUpdate) {
        if !update.is_empty() {
            self.send(OperationProgress::Properties(update));
        }
    }

    /// Reports that one item finished with its final file at `path`.
    pub fn report_item_complete(&self, path: PathBuf) {
        self.send(OperationProgress::ItemComplete(path));
    }

    fn finish(&self, status: OperationStatus, summary: String) {
        self.send(OperationProgress::Finished { status, summary });
    }

    fn send(&self, message: OperationProgress) {
        // A dropped receiver only means nobody is watching.
        let _ = self.progress.send(message);
    }
}

/// The work a [`TransferOrchestrator`] runs in the background.
#[async_trait]
pub trait OperationWorker: Send + 'static {
    /// Arguments accepted by [`TransferOrchestrator::start`].
    type Args: Send + 'static;

    /// Validates and stores the arguments before the task is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidArgs`] if the arguments are unusable.
    fn prepare(&mut self, args: Self::Args) -> Result<(), OperationError>;

    /// Handle used to pause and resume the worker's transfer, if it supports that.
    fn pause_handle(&self) -> Option<Arc<dyn Pausable>> {
        None
    }

    /// Runs the operation to completion and returns its terminal status.
    ///
    /// # Errors
    ///
    /// Any error ends the operation with [`OperationStatus::Failed`].
    async fn work(&mut self, ctx: &WorkContext) -> Result<OperationStatus, OperationError>;

    /// Produces the single summary line for a finished run.
    fn summarize(&self, status: OperationStatus, error: Option<&OperationError>) -> String;
}

/// What a finished operation hands back.
#[derive(Debug)]
pub struct OperationReport<W> {
    /// The worker, with whatever state it accumulated.
    pub worker: W,
    /// Terminal status.
    pub status: OperationStatus,
    /// Summary line, also sent as [`OperationProgress::Finished`].
    pub summary: String,
    /// The error behind a `Failed` status.
    pub error: Option<OperationError>,
}

/// Runs one [`OperationWorker`] in a cancelable Tokio task.
///
/// Dropping the orchestrator requests cancellation of a running task.
pub struct TransferOrchestrator<W: OperationWorker> {
    worker: Option<W>,
    status: Arc<watch::Sender<OperationStatus>>,
    cancel: CancellationToken,
    pause: Option<Arc<dyn Pausable>>,
    task: Option<JoinHandle<OperationReport<W>>>,
}

impl<W: OperationWorker> fmt::Debug for TransferOrchestrator<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOrchestrator")
            .field("status", &self.status())
            .field("started", &self.worker.is_none())
            .field("pausable", &self.pause.is_some())
            .finish_non_exhaustive()
    }
}

impl<W: OperationWorker> TransferOrchestrator<W> {
    /// Wraps `worker` in an idle orchestrator.
    pub fn new(worker: W) -> Self {
        let (status, _) = watch::channel(OperationStatus::Idle);
        Self {
            worker: Some(worker),
            status: Arc::new(status),
            cancel: CancellationToken::new(),
            pause: None,
            task: None,
        }
    }

    /// The worker, until [`start`](Self::start) moves it into the task.
    #[must_use]
    pub fn worker(&self) -> Option<&W> {
        self.worker.as_ref()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<OperationStatus> {
        self.status.subscribe()
    }

    /// Prepares the worker with `args` and spawns it.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AlreadyStarted`] on a second call, or the
    /// worker's error if it rejects the arguments (the orchestrator then stays idle).
    #[instrument(skip_all)]
    pub fn start(&mut self, args: W::Args) -> Result<ProgressReceiver, OperationError> {
        let Some(mut worker) = self.worker.take() else {
            return Err(OperationError::AlreadyStarted);
        };
        if let Err(e) = worker.prepare(args) {
            self.worker = Some(worker);
            return Err(e);
        }

        self.pause = worker.pause_handle();
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = WorkContext {
            cancel: self.cancel.clone(),
            progress: tx,
        };

        self.status.send_replace(OperationStatus::Working);
        debug!("operation started");
        self.task = Some(tokio::spawn(run_worker(
            worker,
            ctx,
            Arc::clone(&self.status),
        )));
        Ok(rx)
    }

    /// Whether [`pause`](Self::pause) would take effect.
    #[must_use]
    pub fn can_pause(&self) -> bool {
        self.status() == OperationStatus::Working
            && self.pause.as_ref().is_some_and(|p| p.can_pause())
    }

    /// Whether [`resume`](Self::resume) would take effect.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.status() == OperationStatus::Paused
            && self.pause.as_ref().is_some_and(|p| p.can_resume())
    }

    /// Whether [`stop`](Self::stop) would take effect.
    #[must_use]
    pub fn can_stop(&self) -> bool {
        self.status().is_active()
    }

    /// Pauses the worker's transfer. Returns whether anything changed.
    pub fn pause(&self) -> bool {
        let Some(handle) = self.pause.as_ref().filter(|_| self.can_pause()) else {
            return false;
        };
        handle.pause();
        self.status.send_if_modified(|status| {
            if *status == OperationStatus::Working {
                *status = OperationStatus::Paused;
                true
            } else {
                false
            }
        })
    }

    /// Resumes the worker's transfer. Returns whether anything changed.
    pub fn resume(&self) -> bool {
        let Some(handle) = self.pause.as_ref().filter(|_| self.can_resume()) else {
            return false;
        };
        handle.resume();
        self.status.send_if_modified(|status| {
            if *status == OperationStatus::Paused {
                *status = OperationStatus::Working;
                true
            } else {
                false
            }
        })
    }

    /// Requests cooperative cancellation of the running task.
    pub fn stop(&self) {
        if self.can_stop() {
            info!("operation cancellation requested");
            self.cancel.cancel();
        }
    }

    /// Waits for the task and returns its report.
    ///
    /// Returns `None` if the operation was never started or was already joined.
    pub async fn join(&mut self) -> Option<OperationReport<W>> {
        let task = self.task.take()?;
        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "operation task did not complete");
                None
            }
        }
    }
}

impl<W: OperationWorker> Drop for TransferOrchestrator<W> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker<W: OperationWorker>(
    mut worker: W,
    ctx: WorkContext,
    status: Arc<watch::Sender<OperationStatus>>,
) -> OperationReport<W> {
    let result = AssertUnwindSafe(worker.work(&ctx)).catch_unwind().await;

    let (final_status, error) = match result {
        Ok(Ok(status)) if status.is_terminal() => (status, None),
        Ok(Ok(status)) => {
            warn!(%status, "worker returned a non-terminal status, treating as success");
            (OperationStatus::Success, None)
        }
        Ok(Err(e)) => (OperationStatus::Failed, Some(e)),
        Err(payload) => (
            OperationStatus::Failed,
            Some(OperationError::Panicked(panic_message(payload.as_ref()))),
        ),
    };

    if let Some(e) = &error {
        warn!(error = %e, "operation failed");
    }
    let summary = worker.summarize(final_status, error.as_ref());
    info!(status = %final_status, summary = %summary, "operation finished");

    status.send_replace(final_status);
    ctx.finish(final_status, summary.clone());

    OperationReport {
        worker,
        status: final_status,
        summary,
        error,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
