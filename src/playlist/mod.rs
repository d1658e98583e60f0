//! Playlist download operation and the collaborators it depends on.
//!
//! [`PlaylistDownloadOperation`] is an
//! [`OperationWorker`](crate::operation::OperationWorker): run it inside a
//! [`TransferOrchestrator`](crate::operation::TransferOrchestrator) to get
//! status, pause/resume, cancellation, and a progress channel.

mod collaborators;
mod error;
mod operation;
mod summary;

pub use collaborators::{
    FormatResolver, MediaFormat, PlaylistInfo, PlaylistItem, PlaylistReader, PlaylistSource,
    RemuxResult, Remuxer, ResolvedFormat, StreamKind,
};
pub use error::ResolveError;
pub use operation::{
    DEFAULT_ENGINE_POLL_INTERVAL, DEFAULT_PLAYLIST_TIMEOUT, PlaylistArgs, PlaylistConfig,
    PlaylistDownloadOperation,
};
pub use summary::{PlaylistTally, playlist_summary};
