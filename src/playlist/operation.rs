//! Drives one [`DownloadEngine`] across every item of a playlist.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::collaborators::{FormatResolver, PlaylistItem, PlaylistSource, Remuxer};
use super::summary::{PlaylistTally, playlist_summary};
use super::ResolveError;
use crate::download::cleanup;
use crate::download::filename::{dash_pair_paths, item_output_path};
use crate::download::{DownloadEngine, EngineEvent, EventReceiver, RunOutcome, TransferUnit};
use crate::format::{format_eta, format_speed};
use crate::operation::{
    OperationError, OperationStatus, OperationWorker, Pausable, PropertyUpdate, WorkContext,
};

/// Default interval between progress reports while an item downloads.
pub const DEFAULT_ENGINE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default time allowed for playlist information to arrive.
pub const DEFAULT_PLAYLIST_TIMEOUT: Duration = Duration::from_secs(30);

const COMBINING_TEXT: &str = "Combining...";
const FETCHING_TITLE: &str = "Getting playlist info...";

/// Tunables for a [`PlaylistDownloadOperation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistConfig {
    /// How often transfer figures are forwarded to the progress channel.
    pub engine_poll_interval: Duration,
    /// Time allowed for playlist information to arrive.
    pub playlist_timeout: Duration,
    /// Whether a canceled item's partial files are deleted.
    pub delete_partial_on_cancel: bool,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            engine_poll_interval: DEFAULT_ENGINE_POLL_INTERVAL,
            playlist_timeout: DEFAULT_PLAYLIST_TIMEOUT,
            delete_partial_on_cancel: true,
        }
    }
}

/// Arguments for [`TransferOrchestrator::start`](crate::operation::TransferOrchestrator::start).
#[derive(Debug, Clone)]
pub struct PlaylistArgs {
    /// Playlist URL handed to the [`PlaylistSource`].
    pub input: String,
    /// Directory the final files are written to.
    pub output: PathBuf,
    /// Prefer separate audio/video streams.
    pub dash: bool,
    /// Preferred vertical resolution.
    pub preferred_quality: u32,
    /// Playlist name, when already known.
    pub playlist_name: Option<String>,
    /// Items, when already known; enumeration is skipped if non-empty.
    pub items: Option<Vec<PlaylistItem>>,
}

impl PlaylistArgs {
    /// Arguments for a playlist that still has to be enumerated.
    pub fn new(input: impl Into<String>, output: impl Into<PathBuf>, dash: bool, preferred_quality: u32) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            dash,
            preferred_quality,
            playlist_name: None,
            items: None,
        }
    }

    /// Supplies the playlist name and items up front.
    #[must_use]
    pub fn with_playlist(mut self, name: impl Into<String>, items: Vec<PlaylistItem>) -> Self {
        self.playlist_name = Some(name.into());
        self.items = Some(items);
        self
    }
}

/// Downloads every item of a playlist, one engine run per item.
///
/// DASH items are fetched as an `_audio`/`_video` pair and merged by the
/// [`Remuxer`]. Each item counts once, either as downloaded or as failed.
pub struct PlaylistDownloadOperation {
    engine: DownloadEngine,
    source: Arc<dyn PlaylistSource>,
    resolver: Arc<dyn FormatResolver>,
    remuxer: Arc<dyn Remuxer>,
    config: PlaylistConfig,
    combining: Arc<AtomicBool>,
    pause_requested: Arc<AtomicBool>,
    input: String,
    output: PathBuf,
    dash: bool,
    preferred_quality: u32,
    playlist_name: Option<String>,
    items: Vec<PlaylistItem>,
    downloaded: usize,
    failed: usize,
    downloaded_files: Vec<PathBuf>,
    errors: Vec<String>,
}

impl std::fmt::Debug for PlaylistDownloadOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistDownloadOperation")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("playlist_name", &self.playlist_name)
            .field("items", &self.items.len())
            .field("downloaded", &self.downloaded)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl PlaylistDownloadOperation {
    /// Creates an operation that downloads through `engine`.
    pub fn new(
        engine: DownloadEngine,
        source: Arc<dyn PlaylistSource>,
        resolver: Arc<dyn FormatResolver>,
        remuxer: Arc<dyn Remuxer>,
        config: PlaylistConfig,
    ) -> Self {
        Self {
            engine,
            source,
            resolver,
            remuxer,
            config,
            combining: Arc::new(AtomicBool::new(false)),
            pause_requested: Arc::new(AtomicBool::new(false)),
            input: String::new(),
            output: PathBuf::new(),
            dash: false,
            preferred_quality: 0,
            playlist_name: None,
            items: Vec::new(),
            downloaded: 0,
            failed: 0,
            downloaded_files: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Playlist name, once known.
    #[must_use]
    pub fn playlist_name(&self) -> Option<&str> {
        self.playlist_name.as_deref()
    }

    /// Items of the playlist.
    #[must_use]
    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    /// Items that ended with a usable file.
    #[must_use]
    pub fn downloaded_count(&self) -> usize {
        self.downloaded
    }

    /// Items that failed, including failed remuxes.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed
    }

    /// Final output path of every item that ended with a usable file, in order.
    #[must_use]
    pub fn downloaded_files(&self) -> &[PathBuf] {
        &self.downloaded_files
    }

    /// One entry per failed remux: the item title followed by ` - {line}` diagnostics.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Whether a DASH pair is being merged right now.
    #[must_use]
    pub fn is_combining(&self) -> bool {
        self.combining.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, ctx), fields(input = %self.input))]
    async fn fetch_playlist(&mut self, ctx: &WorkContext) -> Result<(), ResolveError> {
        let mut reader = self.source.open(&self.input)?;

        let timeout = self.config.playlist_timeout;
        let info = tokio::time::timeout(timeout, reader.wait_for_playlist())
            .await
            .map_err(|_| ResolveError::Timeout { after: timeout })??;
        if self.playlist_name.is_none() {
            self.playlist_name = Some(info.name);
        }

        loop {
            let next = tokio::select! {
                () = ctx.cancelled() => {
                    reader.stop();
                    break;
                }
                next = reader.next() => next?,
            };
            let Some(item) = next else {
                break;
            };
            self.items.push(item);
        }

        info!(
            name = self.playlist_name.as_deref().unwrap_or_default(),
            items = self.items.len(),
            "playlist information retrieved"
        );
        Ok(())
    }

    /// Waits for the current engine run to stop, forwarding transfer figures.
    async fn await_engine(&self, ctx: &WorkContext, events: &mut EventReceiver) -> RunOutcome {
        let mut ticker = tokio::time::interval(self.config.engine_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stop_requested = false;
        let mut dirty = false;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(EngineEvent::Stopped { outcome }) => {
                        if dirty {
                            self.report_transfer(ctx);
                        }
                        return outcome;
                    }
                    Some(EngineEvent::ProgressChanged(_)) => dirty = true,
                    Some(EngineEvent::CalculatedTotalFileSize { total_size }) => {
                        ctx.report_properties(PropertyUpdate::default().with_file_size(total_size));
                    }
                    Some(_) => {}
                    None => {
                        return self.engine.last_outcome().unwrap_or(RunOutcome::Failed);
                    }
                },
                () = ctx.cancelled(), if !stop_requested => {
                    stop_requested = true;
                    debug!("cancellation requested, stopping engine");
                    self.engine.stop(self.config.delete_partial_on_cancel);
                }
                _ = ticker.tick() => {
                    if dirty {
                        dirty = false;
                        self.report_transfer(ctx);
                    }
                }
            }
        }
    }

    fn report_transfer(&self, ctx: &WorkContext) {
        let engine = &self.engine;
        ctx.report_properties(PropertyUpdate::default().with_transfer(
            engine.total_transferred(),
            format_speed(engine.speed()),
            format_eta(engine.eta()),
        ));
        ctx.report_percentage(engine.total_percentage());
    }

    /// Merges a finished DASH pair into `output` and removes both inputs.
    async fn remux(&mut self, ctx: &WorkContext, audio: &Path, video: &Path, output: &Path, title: &str) -> bool {
        self.combining.store(true, Ordering::SeqCst);
        ctx.report_properties(
            PropertyUpdate::default()
                .with_text(COMBINING_TEXT)
                .with_reports_progress(false),
        );

        let result = self.remuxer.combine_dash(video, audio, output).await;
        if !result.success {
            warn!(
                output = %output.display(),
                errors = ?result.errors,
                "remux failed"
            );
            let mut entry = title.to_string();
            for line in &result.errors {
                entry.push_str("\n - ");
                entry.push_str(line);
            }
            self.errors.push(entry);
        }

        cleanup::delete_files(&[audio.to_path_buf(), video.to_path_buf()]).await;
        self.combining.store(false, Ordering::SeqCst);
        ctx.report_properties(
            PropertyUpdate::default()
                .with_text("")
                .with_reports_progress(true),
        );
        result.success
    }
}

#[async_trait]
impl OperationWorker for PlaylistDownloadOperation {
    type Args = PlaylistArgs;

    fn prepare(&mut self, args: PlaylistArgs) -> Result<(), OperationError> {
        let has_items = args.items.as_ref().is_some_and(|items| !items.is_empty());
        if args.input.trim().is_empty() && !has_items {
            return Err(OperationError::InvalidArgs(
                "a playlist input or a list of items is required".into(),
            ));
        }
        if args.output.as_os_str().is_empty() {
            return Err(OperationError::InvalidArgs(
                "output directory must not be empty".into(),
            ));
        }

        self.input = args.input;
        self.output = args.output;
        self.dash = args.dash;
        self.preferred_quality = args.preferred_quality;
        self.playlist_name = args.playlist_name;
        self.pause_requested.store(false, Ordering::SeqCst);
        if let Some(items) = args.items {
            self.items = items;
        }
        Ok(())
    }

    fn pause_handle(&self) -> Option<Arc<dyn Pausable>> {
        Some(Arc::new(PlaylistPauseHandle {
            engine: self.engine.clone(),
            combining: Arc::clone(&self.combining),
            pause_requested: Arc::clone(&self.pause_requested),
        }))
    }

    #[instrument(skip(self, ctx), fields(input = %self.input, output = %self.output.display()))]
    async fn work(&mut self, ctx: &WorkContext) -> Result<OperationStatus, OperationError> {
        ctx.report_properties(
            PropertyUpdate::default()
                .with_title(FETCHING_TITLE)
                .with_reports_progress(true),
        );

        if self.items.is_empty() {
            self.fetch_playlist(ctx).await?;
        }

        let items = self.items.clone();
        let total = items.len();
        let mut events = self.engine.subscribe();

        for (index, item) in items.iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }

            self.engine.clear_files()?;
            let format = self
                .resolver
                .preferred_format(item, self.dash, self.preferred_quality)
                .await?;

            let title = format!("({}/{total}) {}", index + 1, item.title);
            ctx.report_properties(
                PropertyUpdate::default()
                    .with_title(title.clone())
                    .with_duration(item.duration)
                    .with_file_size(format.video.file_size),
            );

            let final_file = item_output_path(&self.output, &item.title, &format.video.extension);

            let dash_pair = format.audio.as_ref().map(|audio| {
                let (audio_path, video_path) = dash_pair_paths(&final_file);
                (audio_path, video_path, audio.download_url.clone())
            });
            let batch = match &dash_pair {
                Some((audio_path, video_path, audio_url)) => vec![
                    TransferUnit::new(audio_path, audio_url.clone()),
                    TransferUnit::new(video_path, format.video.download_url.clone()),
                ],
                None => vec![TransferUnit::new(&final_file, format.video.download_url.clone())],
            };
            let batch_paths: Vec<PathBuf> = batch.iter().map(|u| u.path.clone()).collect();

            debug!(
                title = %item.title,
                dash = dash_pair.is_some(),
                path = %final_file.display(),
                "starting item"
            );
            self.engine.add_files(batch)?;
            self.engine.start()?;
            // Each run starts unpaused; carry a pending pause over to the new run.
            if self.pause_requested.load(Ordering::SeqCst) {
                self.engine.pause();
            }
            let outcome = self.await_engine(ctx, &mut events).await;

            match outcome {
                RunOutcome::Succeeded => {
                    let usable = match &dash_pair {
                        Some((audio_path, video_path, _)) => {
                            self.remux(ctx, audio_path, video_path, &final_file, &title)
                                .await
                        }
                        None => true,
                    };
                    if usable {
                        self.downloaded += 1;
                        info!(path = %final_file.display(), "item downloaded");
                        self.downloaded_files.push(final_file.clone());
                        ctx.report_item_complete(final_file);
                    } else {
                        self.failed += 1;
                    }
                }
                RunOutcome::Failed | RunOutcome::Canceled => {
                    self.failed += 1;
                    warn!(title = %item.title, ?outcome, "item not downloaded");
                    if outcome == RunOutcome::Failed || self.config.delete_partial_on_cancel {
                        cleanup::delete_files(&batch_paths).await;
                    }
                }
            }

            ctx.report_percentage(0.0);
        }

        Ok(if ctx.is_cancelled() {
            OperationStatus::Canceled
        } else {
            OperationStatus::Success
        })
    }

    fn summarize(&self, status: OperationStatus, error: Option<&OperationError>) -> String {
        let tally = PlaylistTally {
            name: self.playlist_name.as_deref(),
            total: self.items.len(),
            downloaded: self.downloaded,
            failed: self.failed,
        };
        let timed_out = error.is_some_and(OperationError::is_timeout);
        playlist_summary(status, tally, timed_out)
    }
}

/// Pauses the engine unless a remux is running.
///
/// The request outlives a single engine run: the operation re-applies it to
/// every item started while it is set.
struct PlaylistPauseHandle {
    engine: DownloadEngine,
    combining: Arc<AtomicBool>,
    pause_requested: Arc<AtomicBool>,
}

impl Pausable for PlaylistPauseHandle {
    fn can_pause(&self) -> bool {
        !self.combining.load(Ordering::SeqCst) && !self.pause_requested.load(Ordering::SeqCst)
    }

    fn can_resume(&self) -> bool {
        !self.combining.load(Ordering::SeqCst) && self.pause_requested.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
        self.engine.pause();
    }

    fn resume(&self) {
        self.pause_requested.store(false, Ordering::SeqCst);
        self.engine.resume();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::{EngineConfig, HttpClient};
    use crate::playlist::collaborators::{PlaylistInfo, PlaylistReader, RemuxResult, ResolvedFormat};

    struct NoSource;

    impl PlaylistSource for NoSource {
        fn open(&self, url: &str) -> Result<Box<dyn PlaylistReader>, ResolveError> {
            Err(ResolveError::NotFound { what: url.into() })
        }
    }

    struct SlowSource;

    struct SlowReader;

    #[async_trait]
    impl PlaylistReader for SlowReader {
        async fn wait_for_playlist(&mut self) -> Result<PlaylistInfo, ResolveError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(PlaylistInfo { name: "never".into() })
        }

        async fn next(&mut self) -> Result<Option<PlaylistItem>, ResolveError> {
            Ok(None)
        }

        fn stop(&mut self) {}
    }

    impl PlaylistSource for SlowSource {
        fn open(&self, _url: &str) -> Result<Box<dyn PlaylistReader>, ResolveError> {
            Ok(Box::new(SlowReader))
        }
    }

    struct NoFormats;

    #[async_trait]
    impl FormatResolver for NoFormats {
        async fn preferred_format(
            &self,
            item: &PlaylistItem,
            _prefer_dash: bool,
            _preferred_quality: u32,
        ) -> Result<ResolvedFormat, ResolveError> {
            Err(ResolveError::unavailable(&item.title, "no formats"))
        }
    }

    struct NoRemux;

    #[async_trait]
    impl Remuxer for NoRemux {
        async fn combine_dash(&self, _video: &Path, _audio: &Path, _output: &Path) -> RemuxResult {
            RemuxResult::failed(vec!["not available".into()])
        }
    }

    fn operation(source: Arc<dyn PlaylistSource>, config: PlaylistConfig) -> PlaylistDownloadOperation {
        let engine = DownloadEngine::new(HttpClient::new(), EngineConfig::default()).unwrap();
        PlaylistDownloadOperation::new(engine, source, Arc::new(NoFormats), Arc::new(NoRemux), config)
    }

    fn item(title: &str) -> PlaylistItem {
        PlaylistItem {
            id: title.to_lowercase(),
            title: title.into(),
            duration: Duration::from_secs(10),
            formats: Vec::new(),
        }
    }

    #[test]
    fn test_prepare_rejects_missing_input() {
        let mut op = operation(Arc::new(NoSource), PlaylistConfig::default());
        let result = op.prepare(PlaylistArgs::new("  ", "/tmp/out", false, 720));
        assert!(matches!(result, Err(OperationError::InvalidArgs(_))));

        let result = op.prepare(PlaylistArgs::new("https://example.com/list", "", false, 720));
        assert!(matches!(result, Err(OperationError::InvalidArgs(_))));
    }

    #[test]
    fn test_prepare_accepts_pre_supplied_items() {
        let mut op = operation(Arc::new(NoSource), PlaylistConfig::default());
        op.prepare(PlaylistArgs::new("", "/tmp/out", true, 1080).with_playlist("Mix", vec![item("A")]))
            .unwrap();
        assert_eq!(op.playlist_name(), Some("Mix"));
        assert_eq!(op.items().len(), 1);
    }

    #[tokio::test]
    async fn test_playlist_timeout_maps_to_timeout_summary() {
        let config = PlaylistConfig {
            playlist_timeout: Duration::from_millis(20),
            ..PlaylistConfig::default()
        };
        let mut orchestrator =
            crate::operation::TransferOrchestrator::new(operation(Arc::new(SlowSource), config));
        let _rx = orchestrator
            .start(PlaylistArgs::new("https://example.com/list", "/tmp/out", false, 720))
            .unwrap();
        let report = orchestrator.join().await.unwrap();

        assert_eq!(report.status, OperationStatus::Failed);
        assert!(report.error.as_ref().is_some_and(OperationError::is_timeout));
        assert_eq!(report.summary, "Timeout. Couldn't get playlist information");
    }

    #[tokio::test]
    async fn test_format_resolution_failure_fails_operation() {
        let mut orchestrator = crate::operation::TransferOrchestrator::new(operation(
            Arc::new(NoSource),
            PlaylistConfig::default(),
        ));
        let _rx = orchestrator
            .start(PlaylistArgs::new("", "/tmp/out", false, 720).with_playlist("Mix", vec![item("A")]))
            .unwrap();
        let report = orchestrator.join().await.unwrap();

        assert_eq!(report.status, OperationStatus::Failed);
        assert!(matches!(
            report.error,
            Some(OperationError::Resolution(ResolveError::Unavailable { .. }))
        ));
        assert_eq!(report.summary, "Couldn't download \"Mix\"");
    }

    #[tokio::test]
    async fn test_source_error_fails_with_generic_summary() {
        let mut orchestrator = crate::operation::TransferOrchestrator::new(operation(
            Arc::new(NoSource),
            PlaylistConfig::default(),
        ));
        let _rx = orchestrator
            .start(PlaylistArgs::new("https://example.com/missing", "/tmp/out", false, 720))
            .unwrap();
        let report = orchestrator.join().await.unwrap();

        assert_eq!(report.status, OperationStatus::Failed);
        assert_eq!(report.summary, "Couldn't download playlist");
    }

    #[test]
    fn test_pause_handle_refuses_while_combining() {
        let op = operation(Arc::new(NoSource), PlaylistConfig::default());
        let handle = op.pause_handle().unwrap();
        op.combining.store(true, Ordering::SeqCst);
        assert!(!handle.can_pause());
        assert!(!handle.can_resume());
    }

    #[test]
    fn test_pause_request_survives_between_runs() {
        let op = operation(Arc::new(NoSource), PlaylistConfig::default());
        let handle = op.pause_handle().unwrap();
        assert!(handle.can_pause());
        assert!(!handle.can_resume());

        handle.pause();
        assert!(op.pause_requested.load(Ordering::SeqCst));
        assert!(!handle.can_pause());
        assert!(handle.can_resume());

        handle.resume();
        assert!(!op.pause_requested.load(Ordering::SeqCst));
        assert!(handle.can_pause());
    }
}
