//! Playlist Downloader Library
//!
//! This library downloads every item of a media playlist to disk with a
//! pausable, cancelable streaming engine, merging DASH audio/video pairs
//! into a single file after download.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Sequential batch download engine with progress events
//! - [`operation`] - Background operation runner with status and progress channel
//! - [`playlist`] - Playlist download operation and its collaborator traits
//! - [`remux`] - ffmpeg-backed DASH remuxer
//! - [`manifest`] - JSON manifest playlist source and format resolver
//! - [`config`] - File configuration for CLI defaults
//! - [`logging`] - Tracing subscriber setup
//! - [`format`] - Human-readable sizes, speeds, and time left

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod format;
pub mod logging;
pub mod manifest;
pub mod operation;
pub mod playlist;
pub mod remux;
mod user_agent;

// Re-export commonly used types
pub use download::{
    DownloadEngine, DownloadError, EngineConfig, EngineError, EngineEvent, HttpClient, RunOutcome,
    TransferUnit,
};
pub use operation::{
    OperationError, OperationProgress, OperationStatus, OperationWorker, TransferOrchestrator,
};
pub use playlist::{
    FormatResolver, PlaylistArgs, PlaylistConfig, PlaylistDownloadOperation, PlaylistSource,
    Remuxer, ResolveError,
};
