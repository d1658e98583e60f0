//! Generic cancelable background operations with a status state machine.
//!
//! A [`TransferOrchestrator`] runs one [`OperationWorker`] in a Tokio task and
//! exposes:
//! - a status value (`Idle → Working → {Success, Failed, Canceled}`, with
//!   `Working ⇄ Paused` when the worker supports pausing)
//! - a single ordered progress channel ending with
//!   [`OperationProgress::Finished`]
//! - cooperative cancellation

mod error;
mod orchestrator;
mod progress;
mod status;

pub use error::OperationError;
pub use orchestrator::{OperationReport, OperationWorker, Pausable, TransferOrchestrator, WorkContext};
pub use progress::{OperationProgress, ProgressReceiver, PropertyUpdate};
pub use status::OperationStatus;
