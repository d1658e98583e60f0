//! ffmpeg-backed [`Remuxer`] for DASH audio/video pairs.
//!
//! Both streams are copied into one container without re-encoding. Every
//! ffmpeg invocation is appended to a daily-rotated `remux.log` when a log
//! directory is configured.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::playlist::{RemuxResult, Remuxer};

/// Default ffmpeg executable, resolved through `PATH`.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Number of trailing ffmpeg stderr lines kept in a failure report.
const STDERR_TAIL_LINES: usize = 5;

/// Errors raised while running the remux tool.
#[derive(Debug, Error)]
pub enum RemuxError {
    /// The executable could not be started.
    #[error("failed to run {}: {source}", .program.display())]
    Spawn {
        /// Executable path.
        program: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The remux log could not be opened.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Runs ffmpeg to merge DASH streams.
#[derive(Debug)]
pub struct FfmpegRemuxer {
    ffmpeg: PathBuf,
    log: Option<Mutex<RollingFileAppender>>,
}

impl Default for FfmpegRemuxer {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG)
    }
}

impl FfmpegRemuxer {
    /// Creates a remuxer for the given ffmpeg executable, without a log.
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            log: None,
        }
    }

    /// Appends every invocation to `<dir>/remux.<date>.log`.
    ///
    /// # Errors
    ///
    /// Returns [`RemuxError::Io`] if the directory cannot be created.
    pub fn with_log_dir(mut self, dir: &Path) -> Result<Self, RemuxError> {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("remux")
            .filename_suffix("log")
            .build(dir)
            .map_err(|e| RemuxError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::other(e),
            })?;
        self.log = Some(Mutex::new(appender));
        Ok(self)
    }

    /// The ffmpeg executable in use.
    #[must_use]
    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Inspects `audio` and explains why it may not combine.
    ///
    /// Returns one line per problem found; an empty list means nothing looked wrong.
    #[instrument(skip_all, fields(audio = %audio.display()))]
    pub async fn check_combine(&self, audio: &Path) -> Vec<String> {
        let args = vec![OsString::from("-i"), audio.as_os_str().to_owned()];
        match self.run(&args).await {
            Ok((_, stderr)) => probe_diagnostics(&stderr),
            Err(e) => vec![e.to_string()],
        }
    }

    async fn run(&self, args: &[OsString]) -> Result<(ExitStatus, String), RemuxError> {
        let output = tokio::process::Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| RemuxError::Spawn {
                program: self.ffmpeg.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        self.write_log(args, &stderr);
        Ok((output.status, stderr))
    }

    fn write_log(&self, args: &[OsString], stderr: &str) {
        let Some(log) = &self.log else {
            return;
        };
        let command = args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

        let mut writer = log.lock().unwrap_or_else(PoisonError::into_inner);
        let result = write!(
            writer,
            "[{timestamp}]\ncmd: {} {command}\n\nOUTPUT\n{stderr}\n\n\n",
            self.ffmpeg.display()
        );
        if let Err(e) = result {
            warn!(error = %e, "failed to write remux log");
        }
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    #[instrument(skip_all, fields(video = %video.display(), audio = %audio.display(), output = %output.display()))]
    async fn combine_dash(&self, video: &Path, audio: &Path, output: &Path) -> RemuxResult {
        let args = combine_args(video, audio, output);
        match self.run(&args).await {
            Ok((status, _)) if status.success() && output.exists() => {
                debug!("remux succeeded");
                RemuxResult::ok()
            }
            Ok((status, stderr)) => {
                let mut errors = self.check_combine(audio).await;
                errors.push(format!("ffmpeg exited with {status}"));
                errors.extend(stderr_tail(&stderr, STDERR_TAIL_LINES));
                RemuxResult::failed(errors)
            }
            Err(e) => RemuxResult::failed(vec![e.to_string()]),
        }
    }
}

/// Arguments that copy both codecs into `output`, overwriting it.
fn combine_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(10);
    args.push("-y".into());
    args.push("-i".into());
    args.push(video.as_os_str().to_owned());
    args.push("-i".into());
    args.push(audio.as_os_str().to_owned());
    for flag in ["-vcodec", "copy", "-acodec", "copy"] {
        args.push(flag.into());
    }
    args.push(output.as_os_str().to_owned());
    args
}

/// Reads ffmpeg's description of an audio input and lists what looks wrong.
fn probe_diagnostics(stderr: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut has_audio = false;

    for line in stderr.lines().map(str::trim) {
        if line.starts_with("major_brand") {
            let brand = line.split(':').nth(1).map_or("", str::trim);
            if !brand.contains("dash") {
                errors.push("Audio doesn't appear to be a DASH file. Non-critical.".to_string());
            }
        } else if line.starts_with("Stream #") {
            if line.contains("Audio") {
                has_audio = true;
            } else if line.contains("Video") {
                errors.push("Audio file also has a video stream.".to_string());
            }
        }
    }

    if !has_audio {
        errors.push("Audio file has no audio stream.".to_string());
    }
    errors
}

fn stderr_tail(stderr: &str, lines: usize) -> Vec<String> {
    let collected: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = collected.len().saturating_sub(lines);
    collected[start..].iter().map(|l| (*l).to_string()).collect()
}
