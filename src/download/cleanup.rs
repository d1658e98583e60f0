//! Delayed, bounded-retry deletion of unfinished files.
//!
//! A just-stopped writer may still hold the file open (on some platforms that
//! blocks deletion), so each path is retried a fixed number of times at a
//! fixed interval before it is given up on.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

/// Deletes every path in `paths`, retrying failures up to `attempts` times `interval` apart.
///
/// Returns the paths that were still present after the last attempt.
pub async fn delete_with_retries(
    paths: Vec<PathBuf>,
    attempts: u32,
    interval: Duration,
) -> Vec<PathBuf> {
    let mut pending: Vec<(PathBuf, u32)> = paths.into_iter().map(|path| (path, 0)).collect();
    let mut abandoned = Vec::new();

    while !pending.is_empty() {
        let mut still_pending = Vec::with_capacity(pending.len());
        for (path, failures) in pending {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "deleted unfinished file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    let failures = failures + 1;
                    if failures >= attempts {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            attempts,
                            "giving up on deleting unfinished file"
                        );
                        abandoned.push(path);
                    } else {
                        debug!(path = %path.display(), error = %e, failures, "delete failed, will retry");
                        still_pending.push((path, failures));
                    }
                }
            }
        }

        pending = still_pending;
        if !pending.is_empty() {
            tokio::time::sleep(interval).await;
        }
    }

    abandoned
}

/// Deletes each path once, ignoring files that do not exist.
pub async fn delete_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "deleted file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete file"),
        }
    }
}
