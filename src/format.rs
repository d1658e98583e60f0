//! Human-readable sizes, speeds, and time-left strings for progress displays.

use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Format bytes to human-readable string.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Format bytes per second as a human-readable string.
#[must_use]
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format time left as `[ mm:ss ]` (or `[ h:mm:ss ]`); empty when unknown or zero.
#[must_use]
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(total_secs) = eta.map(|d| d.as_secs()).filter(|s| *s > 0) else {
        return String::new();
    };
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("[ {hours}:{minutes:02}:{seconds:02} ]")
    } else {
        format!("[ {minutes:02}:{seconds:02} ]")
    }
}
