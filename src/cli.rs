//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use playlist_downloader::config::FileConfig;
use playlist_downloader::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, READ_TIMEOUT_SECS,
};
use playlist_downloader::remux::DEFAULT_FFMPEG;

/// Preferred vertical resolution when neither flag nor config sets one.
pub const DEFAULT_QUALITY: u32 = 720;

/// Download every item of a playlist manifest.
///
/// Items are fetched one at a time with a resumable, cancelable transfer.
/// DASH items are downloaded as separate audio and video streams and merged
/// with ffmpeg. Press Ctrl-C to cancel; partial files are removed.
#[derive(Parser, Debug)]
#[command(name = "playlist-dl")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the JSON playlist manifest
    pub manifest: PathBuf,

    /// Directory to write downloaded items to (default: current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Prefer separate audio/video streams and remux them with ffmpeg
    #[arg(long)]
    pub dash: bool,

    /// Preferred vertical resolution, e.g. 720 or 1080
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=4320))]
    pub quality: Option<u32>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Directory for rotating log files (application and remux logs)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Keep partially downloaded files when canceled
    #[arg(long)]
    pub keep_partial: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Effective settings after applying CLI flags over file config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub output_dir: PathBuf,
    pub dash: bool,
    pub preferred_quality: u32,
    pub ffmpeg: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub chunk_size: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl RunSettings {
    /// Merges `args` over `file`; flags always win.
    pub fn resolve(args: &Args, file: &FileConfig) -> Self {
        Self {
            output_dir: args
                .output
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            dash: args.dash || file.dash.unwrap_or(false),
            preferred_quality: args
                .quality
                .or(file.preferred_quality)
                .unwrap_or(DEFAULT_QUALITY),
            ffmpeg: args
                .ffmpeg
                .clone()
                .or_else(|| file.ffmpeg_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG)),
            log_dir: args.log_dir.clone().or_else(|| file.log_dir.clone()),
            chunk_size: file.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        }
    }
}
