//! The single summary line shown when a playlist run ends.

use crate::operation::OperationStatus;

/// Counters a summary is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistTally<'a> {
    /// Playlist name, if it was learned.
    pub name: Option<&'a str>,
    /// Number of items in the playlist.
    pub total: usize,
    /// Items that ended with a usable file.
    pub downloaded: usize,
    /// Items that failed, including a failed remux.
    pub failed: usize,
}

/// Builds the summary line for a finished run.
///
/// `timed_out` marks a failure to fetch playlist information in time, which is
/// reported distinctly from a failed download.
#[must_use]
pub fn playlist_summary(status: OperationStatus, tally: PlaylistTally<'_>, timed_out: bool) -> String {
    let name = tally.name.filter(|n| !n.is_empty());
    match status {
        OperationStatus::Canceled => match name {
            Some(name) if tally.total > 0 => format!(
                "\"{name}\" canceled. {} of {} items downloaded",
                tally.downloaded, tally.total
            ),
            _ => "Playlist canceled".to_string(),
        },
        OperationStatus::Failed => {
            if timed_out {
                "Timeout. Couldn't get playlist information".to_string()
            } else if let Some(name) = name {
                format!("Couldn't download \"{name}\"")
            } else {
                "Couldn't download playlist".to_string()
            }
        }
        OperationStatus::Success => {
            let name = name.unwrap_or("playlist");
            if tally.failed == 0 {
                format!("Downloaded \"{name}\" playlist. {} items", tally.total)
            } else {
                format!(
                    "Downloaded \"{name}\" playlist. {} of {} items, {} failed",
                    tally.downloaded, tally.total, tally.failed
                )
            }
        }
        OperationStatus::Idle | OperationStatus::Working | OperationStatus::Paused => {
            format!("Playlist {status}")
        }
    }
}
