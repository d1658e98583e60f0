//! Constants for the download module (timeouts, chunking, cleanup policy).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP per-read timeout (5 minutes of body inactivity).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default number of bytes read from the body per transfer-loop iteration.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default number of chunks per speed sample window.
pub const DEFAULT_SPEED_SAMPLE_CYCLES: u32 = 5;

/// Upper bound for a configurable chunk size (8 MiB).
pub const MAX_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Safety re-check interval while a transfer is paused.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of deletion attempts per unfinished file after a cancel.
pub const CLEANUP_ATTEMPTS: u32 = 10;

/// Delay between deletion attempts.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(2);
