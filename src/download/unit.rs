//! A single file fetched by the engine.

use std::path::{Path, PathBuf};

/// One file to be fetched: where it goes, where it comes from, and how far along it is.
///
/// `total_size` stays `0` until the engine learns the content length. Counters
/// are only written by the engine run that owns the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferUnit {
    /// Destination path; replaced if it already exists.
    pub path: PathBuf,
    /// Source URL.
    pub url: String,
    /// Content length in bytes, `0` while unknown.
    pub total_size: u64,
    /// Bytes written to `path` so far.
    pub transferred: u64,
    /// Set once every byte arrived and the run was not canceled.
    pub finished: bool,
}

impl TransferUnit {
    /// Creates a unit with zeroed counters.
    pub fn new(path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            total_size: 0,
            transferred: 0,
            finished: false,
        }
    }

    /// Directory the unit is written into, if the path has one.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }

    /// Whether the content length is known.
    #[must_use]
    pub fn size_known(&self) -> bool {
        self.total_size > 0
    }

    pub(crate) fn reset_progress(&mut self) {
        self.transferred = 0;
        self.finished = false;
    }
}
