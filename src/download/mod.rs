//! Batch download engine for streaming media files to disk.
//!
//! This module provides functionality for downloading an ordered batch of
//! files over HTTP/HTTPS with bounded memory, pause/resume, and cooperative
//! cancellation.
//!
//! # Features
//!
//! - Streaming downloads in fixed-size chunks (memory-efficient for large files)
//! - Size probe for the whole batch before transfer, for percentage and ETA
//! - Windowed speed sampling
//! - Pause without closing the connection
//! - Cancellation with delayed, bounded-retry deletion of unfinished files
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use playlist_downloader::download::{DownloadEngine, EngineConfig, HttpClient, TransferUnit};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(HttpClient::new(), EngineConfig::default())?;
//! engine.add_files(vec![TransferUnit::new("./downloads/clip.mp4", "https://example.com/clip.mp4")])?;
//! engine.start()?;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
mod client;
pub mod constants;
mod engine;
mod error;
mod events;
pub mod filename;
mod speed;
mod unit;

pub use client::{HttpClient, StreamingBody};
pub use engine::{DownloadEngine, EngineConfig};
pub use error::{DownloadError, EngineError};
pub use events::{EngineEvent, EventReceiver, ProgressSnapshot, RunOutcome};
pub use speed::{SpeedEstimator, eta_for};
pub use unit::TransferUnit;

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
