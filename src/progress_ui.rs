//! Terminal rendering of an operation's progress channel.

use indicatif::{ProgressBar, ProgressStyle};

use playlist_downloader::operation::{OperationProgress, PropertyUpdate};

/// One progress bar for the whole playlist run.
pub(crate) struct ProgressUi {
    bar: ProgressBar,
    text: String,
    transfer: String,
}

impl ProgressUi {
    /// A visible bar when `enabled`, otherwise a hidden one that ignores updates.
    pub(crate) fn new(enabled: bool) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{wide_msg}\n[{bar:40}] {pos:>3}% {prefix}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            text: String::new(),
            transfer: String::new(),
        }
    }

    pub(crate) fn apply(&mut self, message: &OperationProgress) {
        match message {
            OperationProgress::Percentage(percentage) => {
                self.bar.set_position(percent_position(*percentage));
            }
            OperationProgress::Properties(update) => self.apply_properties(update),
            OperationProgress::ItemComplete(path) => {
                self.bar.println(format!("Saved {}", path.display()));
            }
            OperationProgress::Finished { .. } => {}
        }
    }

    fn apply_properties(&mut self, update: &PropertyUpdate) {
        if let Some(title) = &update.title {
            self.bar.set_message(title.clone());
        }
        if let Some(text) = &update.text {
            self.text.clone_from(text);
        }
        if let (Some(speed), Some(eta)) = (&update.speed, &update.eta) {
            self.transfer = format!("{speed} {eta}").trim_end().to_string();
        }
        let prefix = if self.text.is_empty() {
            &self.transfer
        } else {
            &self.text
        };
        self.bar.set_prefix(prefix.clone());
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent_position(percentage: f64) -> u64 {
    percentage.clamp(0.0, 100.0).round() as u64
}
