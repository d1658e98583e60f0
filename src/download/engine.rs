//! Sequential, pausable, cancelable batch download engine.
//!
//! This module provides the `DownloadEngine` which performs one pass over an
//! ordered batch of [`TransferUnit`]s per run: a size probe for every unit,
//! then a chunked streaming transfer of each unit in batch order.
//!
//! # Overview
//!
//! A run executes in its own Tokio task. Controls (`pause`, `resume`, `stop`)
//! and queries may be called from any task at any time. Everything the run
//! does is reported through [`EngineEvent`]s delivered to each subscriber in
//! order, ending with exactly one [`EngineEvent::Stopped`].
//!
//! # Example
//!
//! ```no_run
//! use playlist_downloader::download::{DownloadEngine, EngineConfig, EngineEvent, HttpClient, TransferUnit};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(HttpClient::new(), EngineConfig::default())?;
//! let mut events = engine.subscribe();
//! engine.add_files(vec![TransferUnit::new("./out/clip.mp4", "https://example.com/clip.mp4")])?;
//! engine.start()?;
//! while let Some(event) = events.recv().await {
//!     if let EngineEvent::Stopped { outcome } = event {
//!         println!("finished: {outcome:?}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::cleanup;
use super::constants::{
    CLEANUP_ATTEMPTS, CLEANUP_INTERVAL, DEFAULT_CHUNK_SIZE, DEFAULT_SPEED_SAMPLE_CYCLES,
    MAX_CHUNK_SIZE, PAUSE_POLL_INTERVAL,
};
use super::events::{EventEmitter, EventReceiver, ProgressSnapshot};
use super::speed::{self, SpeedEstimator};
use super::{DownloadError, EngineError, EngineEvent, HttpClient, RunOutcome, TransferUnit};

/// Tunables for a [`DownloadEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bytes read from the body per loop iteration.
    pub chunk_size: usize,
    /// Chunks per speed sample window.
    pub speed_sample_cycles: u32,
    /// How often a paused transfer re-checks its gate.
    pub pause_poll_interval: Duration,
    /// Deletion attempts per unfinished file after a cancel.
    pub cleanup_attempts: u32,
    /// Delay between deletion attempts.
    pub cleanup_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            speed_sample_cycles: DEFAULT_SPEED_SAMPLE_CYCLES,
            pause_poll_interval: PAUSE_POLL_INTERVAL,
            cleanup_attempts: CLEANUP_ATTEMPTS,
            cleanup_interval: CLEANUP_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidChunkSize`] if `chunk_size` is zero or
    /// above the supported maximum.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(EngineError::InvalidChunkSize {
                value: self.chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }
        Ok(())
    }
}

/// Batch download engine.
///
/// The handle is cheap to clone; all clones drive the same engine. Only one
/// run is active at a time, and the batch can only be changed between runs.
///
/// # Concurrency Model
///
/// - Each run executes in its own Tokio task, units strictly one after another
/// - Pause is a gate the transfer loop awaits; the connection stays open
/// - Cancellation is cooperative and checked before every chunk
/// - Counters are atomics and can be read from any task during a run
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    client: HttpClient,
    config: EngineConfig,
    busy: AtomicBool,
    paused: watch::Sender<bool>,
    cancel: Mutex<CancellationToken>,
    canceled: AtomicBool,
    delete_unfinished: AtomicBool,
    total_size: AtomicU64,
    total_transferred: AtomicU64,
    speed: AtomicU64,
    current_index: AtomicUsize,
    files: Mutex<Vec<TransferUnit>>,
    outcome: Mutex<Option<RunOutcome>>,
    cleanup: Mutex<Option<JoinHandle<Vec<PathBuf>>>>,
    events: EventEmitter,
}

/// Result of transferring one unit.
enum UnitResult {
    Finished,
    Canceled,
}

impl DownloadEngine {
    /// Creates an idle engine with an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidChunkSize`] if the configuration is invalid.
    #[instrument(level = "debug", skip(client))]
    pub fn new(client: HttpClient, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let (paused, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(EngineInner {
                client,
                config,
                busy: AtomicBool::new(false),
                paused,
                cancel: Mutex::new(CancellationToken::new()),
                canceled: AtomicBool::new(false),
                delete_unfinished: AtomicBool::new(false),
                total_size: AtomicU64::new(0),
                total_transferred: AtomicU64::new(0),
                speed: AtomicU64::new(0),
                current_index: AtomicUsize::new(0),
                files: Mutex::new(Vec::new()),
                outcome: Mutex::new(None),
                cleanup: Mutex::new(None),
                events: EventEmitter::default(),
            }),
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Registers a new event subscriber.
    ///
    /// Events emitted before this call are not replayed.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    /// Appends units to the batch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] while a run is in progress.
    pub fn add_files(&self, units: impl IntoIterator<Item = TransferUnit>) -> Result<(), EngineError> {
        if self.is_busy() {
            return Err(EngineError::busy("add_files"));
        }
        self.lock_files().extend(units);
        Ok(())
    }

    /// Empties the batch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] while a run is in progress.
    pub fn clear_files(&self) -> Result<(), EngineError> {
        if self.is_busy() {
            return Err(EngineError::busy("clear_files"));
        }
        self.lock_files().clear();
        Ok(())
    }

    /// Snapshot of the batch with its current counters.
    #[must_use]
    pub fn files(&self) -> Vec<TransferUnit> {
        self.lock_files().clone()
    }

    /// Starts a run over the current batch.
    ///
    /// Emits [`EngineEvent::Started`] before returning. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] if a run is already in progress,
    /// or [`EngineError::EmptyBatch`] if there is nothing to transfer.
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<(), EngineError> {
        let inner = &self.inner;
        if inner
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::busy("start"));
        }

        let unit_count = {
            let mut files = self.lock_files();
            for unit in files.iter_mut() {
                unit.reset_progress();
            }
            files.len()
        };
        if unit_count == 0 {
            inner.busy.store(false, Ordering::SeqCst);
            return Err(EngineError::EmptyBatch);
        }

        inner.total_size.store(0, Ordering::SeqCst);
        inner.total_transferred.store(0, Ordering::SeqCst);
        inner.speed.store(0, Ordering::SeqCst);
        inner.current_index.store(0, Ordering::SeqCst);
        inner.canceled.store(false, Ordering::SeqCst);
        inner.delete_unfinished.store(false, Ordering::SeqCst);
        inner.paused.send_replace(false);
        *lock(&inner.outcome) = None;

        let token = CancellationToken::new();
        *lock(&inner.cancel) = token.clone();

        info!(units = unit_count, "starting download run");
        inner.events.emit(EngineEvent::Started);

        let engine = self.clone();
        tokio::spawn(async move { engine.run(token).await });
        Ok(())
    }

    /// Holds the transfer loop before its next chunk.
    ///
    /// No-op unless a run is active and not already paused.
    pub fn pause(&self) {
        if !self.is_busy() || self.was_canceled() {
            return;
        }
        let changed = self.inner.paused.send_if_modified(|paused| {
            if *paused {
                false
            } else {
                *paused = true;
                true
            }
        });
        if changed {
            debug!("download paused");
            self.inner.events.emit(EngineEvent::Paused);
        }
    }

    /// Releases a paused transfer loop.
    ///
    /// No-op unless a run is active and paused.
    pub fn resume(&self) {
        if !self.is_busy() {
            return;
        }
        let changed = self.inner.paused.send_if_modified(|paused| {
            if *paused {
                *paused = false;
                true
            } else {
                false
            }
        });
        if changed {
            debug!("download resumed");
            self.inner.events.emit(EngineEvent::Resumed);
        }
    }

    /// Requests cooperative cancellation of the active run.
    ///
    /// Emits [`EngineEvent::Canceled`] once per run. When `delete_unfinished`
    /// is set, every unit that did not finish is deleted after the run lets go
    /// of its file, retrying per the configured cleanup policy.
    #[instrument(skip(self))]
    pub fn stop(&self, delete_unfinished: bool) {
        if !self.is_busy() {
            return;
        }
        if delete_unfinished {
            self.inner.delete_unfinished.store(true, Ordering::SeqCst);
        }
        if self.inner.canceled.swap(true, Ordering::SeqCst) {
            return;
        }

        lock(&self.inner.cancel).cancel();
        self.inner.paused.send_replace(false);
        info!(delete_unfinished, "download run cancellation requested");
        self.inner.events.emit(EngineEvent::Canceled);
    }

    /// Waits for the deletion scheduled by the last canceled run, if any.
    ///
    /// Returns the paths that could not be deleted.
    pub async fn wait_for_cleanup(&self) -> Vec<PathBuf> {
        let handle = lock(&self.inner.cleanup).take();
        match handle {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Whether the active run is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    /// Whether cancellation was requested for the current or last run.
    #[must_use]
    pub fn was_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Whether [`start`](Self::start) would be accepted.
    #[must_use]
    pub fn can_start(&self) -> bool {
        !self.is_busy() && !self.lock_files().is_empty()
    }

    /// Whether [`pause`](Self::pause) would take effect.
    #[must_use]
    pub fn can_pause(&self) -> bool {
        self.is_busy() && !self.is_paused() && !self.was_canceled()
    }

    /// Whether [`resume`](Self::resume) would take effect.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.is_busy() && self.is_paused()
    }

    /// Whether [`stop`](Self::stop) would take effect.
    #[must_use]
    pub fn can_stop(&self) -> bool {
        self.is_busy() && !self.was_canceled()
    }

    /// The unit currently being transferred, while a run is active.
    #[must_use]
    pub fn current_file(&self) -> Option<TransferUnit> {
        if !self.is_busy() {
            return None;
        }
        let index = self.inner.current_index.load(Ordering::SeqCst);
        self.lock_files().get(index).cloned()
    }

    /// Sum of all known unit sizes for the current or last run.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.inner.total_size.load(Ordering::SeqCst)
    }

    /// Bytes written across the batch in the current or last run.
    #[must_use]
    pub fn total_transferred(&self) -> u64 {
        self.inner.total_transferred.load(Ordering::SeqCst)
    }

    /// Last sampled speed in bytes per second.
    #[must_use]
    pub fn speed(&self) -> u64 {
        self.inner.speed.load(Ordering::SeqCst)
    }

    /// Estimated time to finish the batch at the last sampled speed.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        speed::eta_for(self.speed(), self.total_size(), self.total_transferred())
    }

    /// Batch progress in percent, rounded to two decimals.
    ///
    /// Returns `0.0` while the total size is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_percentage(&self) -> f64 {
        let total = self.total_size();
        if total == 0 {
            return 0.0;
        }
        let ratio = self.total_transferred() as f64 / total as f64;
        (ratio * 100.0 * 100.0).round() / 100.0
    }

    /// Outcome of the last finished run, `None` while running or before the first run.
    #[must_use]
    pub fn last_outcome(&self) -> Option<RunOutcome> {
        *lock(&self.inner.outcome)
    }

    #[instrument(skip(self, token))]
    async fn run(self, token: CancellationToken) {
        let inner = &self.inner;
        let unit_count = self.lock_files().len();

        self.probe_sizes(&token).await;

        let mut buffer = vec![0u8; inner.config.chunk_size];
        let mut speed =
            SpeedEstimator::new(inner.config.chunk_size, inner.config.speed_sample_cycles);
        let mut paused_rx = inner.paused.subscribe();
        let mut any_failed = false;

        for index in 0..unit_count {
            if token.is_cancelled() {
                break;
            }
            inner.current_index.store(index, Ordering::SeqCst);

            let result = self
                .transfer_unit(index, &token, &mut buffer, &mut paused_rx, &mut speed)
                .await;
            let unit = self.unit_snapshot(index);

            match result {
                Ok(UnitResult::Finished) => {
                    let unit = self.update_unit(index, |u| u.finished = true).or(unit);
                    if let Some(unit) = unit.clone() {
                        debug!(path = %unit.path.display(), bytes = unit.transferred, "unit finished");
                        inner.events.emit(EngineEvent::FileDownloadSucceeded(unit));
                    }
                    if let Some(unit) = unit {
                        inner.events.emit(EngineEvent::FileDownloadComplete(unit));
                    }
                }
                Ok(UnitResult::Canceled) => {
                    if let Some(unit) = unit {
                        debug!(path = %unit.path.display(), "unit interrupted by cancellation");
                        inner.events.emit(EngineEvent::FileDownloadComplete(unit));
                    }
                }
                Err(error) => {
                    any_failed = true;
                    if let Some(unit) = unit {
                        warn!(
                            url = %unit.url,
                            path = %unit.path.display(),
                            error = %error,
                            "unit download failed"
                        );
                        inner.events.emit(EngineEvent::FileDownloadFailed {
                            error: Arc::new(error),
                            unit: unit.clone(),
                        });
                        inner.events.emit(EngineEvent::FileDownloadComplete(unit));
                    }
                }
            }
        }

        let canceled = token.is_cancelled();
        let outcome = if canceled {
            RunOutcome::Canceled
        } else if any_failed {
            RunOutcome::Failed
        } else {
            RunOutcome::Succeeded
        };

        if canceled && inner.delete_unfinished.load(Ordering::SeqCst) {
            self.schedule_cleanup();
        }

        inner.paused.send_replace(false);
        *lock(&inner.outcome) = Some(outcome);
        inner.busy.store(false, Ordering::SeqCst);

        info!(
            ?outcome,
            transferred = inner.total_transferred.load(Ordering::SeqCst),
            "download run stopped"
        );
        if !canceled {
            inner.events.emit(EngineEvent::Completed);
        }
        inner.events.emit(EngineEvent::Stopped { outcome });
    }

    /// Learns every unit's content length; failures count as unknown size.
    async fn probe_sizes(&self, token: &CancellationToken) {
        let targets: Vec<String> = self.lock_files().iter().map(|u| u.url.clone()).collect();
        let mut total = 0u64;

        for (index, url) in targets.iter().enumerate() {
            let probe = tokio::select! {
                biased;
                () = token.cancelled() => break,
                probe = self.inner.client.probe_content_length(url) => probe,
            };
            let size = match probe {
                Ok(size) => size.unwrap_or(0),
                Err(e) => {
                    debug!(url = %url, error = %e, "size probe failed, treating size as unknown");
                    0
                }
            };
            self.update_unit(index, |u| u.total_size = size);
            total = total.saturating_add(size);
        }

        self.inner.total_size.store(total, Ordering::SeqCst);
        debug!(total_size = total, "calculated total file size");
        self.inner
            .events
            .emit(EngineEvent::CalculatedTotalFileSize { total_size: total });
    }

    async fn transfer_unit(
        &self,
        index: usize,
        token: &CancellationToken,
        buffer: &mut [u8],
        paused_rx: &mut watch::Receiver<bool>,
        speed: &mut SpeedEstimator,
    ) -> Result<UnitResult, DownloadError> {
        let Some(unit) = self.unit_snapshot(index) else {
            return Ok(UnitResult::Canceled);
        };

        if let Some(dir) = unit.directory() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| DownloadError::io(dir, e))?;
        }
        let mut file = tokio::fs::File::create(&unit.path)
            .await
            .map_err(|e| DownloadError::io(&unit.path, e))?;

        let mut body = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(UnitResult::Canceled),
            body = self.inner.client.open_stream(&unit.url) => body?,
        };

        let size = match body.content_length() {
            Some(len) if len > 0 => len,
            _ => unit.total_size,
        };
        self.reconcile_size(index, unit.total_size, size);

        let mut transferred = 0u64;
        speed.restart_window();

        loop {
            if token.is_cancelled() {
                break;
            }
            if self.wait_while_paused(token, paused_rx).await {
                speed.restart_window();
                if token.is_cancelled() {
                    break;
                }
            }

            let want = if size > 0 {
                let remaining = size.saturating_sub(transferred);
                usize::try_from(remaining).map_or(buffer.len(), |r| r.min(buffer.len()))
            } else {
                buffer.len()
            };
            if want == 0 {
                break;
            }

            let read = tokio::select! {
                biased;
                () = token.cancelled() => break,
                read = body.read_chunk(&mut buffer[..want]) => read?,
            };
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read])
                .await
                .map_err(|e| DownloadError::io(&unit.path, e))?;
            transferred += read as u64;
            self.record_progress(index, transferred, read as u64, size == 0);

            if let Some(sample) = speed.record_chunk() {
                self.inner.speed.store(sample, Ordering::SeqCst);
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io(&unit.path, e))?;
        drop(file);

        if token.is_cancelled() {
            return Ok(UnitResult::Canceled);
        }
        if size > 0 && transferred < size {
            return Err(DownloadError::integrity(&unit.path, size, transferred));
        }
        Ok(UnitResult::Finished)
    }

    /// Blocks while paused. Returns whether the loop was actually held.
    async fn wait_while_paused(
        &self,
        token: &CancellationToken,
        paused_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut held = false;
        loop {
            let paused = *paused_rx.borrow_and_update();
            if !paused || token.is_cancelled() {
                return held;
            }
            held = true;
            tokio::select! {
                () = token.cancelled() => {}
                _ = paused_rx.changed() => {}
                () = tokio::time::sleep(self.inner.config.pause_poll_interval) => {}
            }
        }
    }

    /// Folds a size learned from the GET into the batch total.
    fn reconcile_size(&self, index: usize, probed: u64, actual: u64) {
        if actual == probed || actual == 0 {
            return;
        }
        self.update_unit(index, |u| u.total_size = actual);
        let total = if actual > probed {
            self.inner
                .total_size
                .fetch_add(actual - probed, Ordering::SeqCst)
                + (actual - probed)
        } else {
            self.inner
                .total_size
                .fetch_sub(probed - actual, Ordering::SeqCst)
                - (probed - actual)
        };
        debug!(index, probed, actual, total_size = total, "reconciled unit size");
        self.inner
            .events
            .emit(EngineEvent::CalculatedTotalFileSize { total_size: total });
    }

    fn record_progress(&self, index: usize, unit_transferred: u64, read: u64, size_unknown: bool) {
        let inner = &self.inner;
        if size_unknown {
            inner.total_size.fetch_add(read, Ordering::SeqCst);
        }
        let unit_size = self
            .update_unit(index, |u| {
                u.transferred = unit_transferred;
                if size_unknown {
                    u.total_size = unit_transferred;
                }
            })
            .map_or(0, |u| u.total_size);
        let total_transferred = inner.total_transferred.fetch_add(read, Ordering::SeqCst) + read;

        inner
            .events
            .emit(EngineEvent::ProgressChanged(ProgressSnapshot {
                unit_index: index,
                unit_transferred,
                unit_size,
                total_transferred,
                total_size: inner.total_size.load(Ordering::SeqCst),
                speed: inner.speed.load(Ordering::SeqCst),
            }));
    }

    fn schedule_cleanup(&self) {
        let unfinished: Vec<PathBuf> = self
            .lock_files()
            .iter()
            .filter(|u| !u.finished)
            .map(|u| u.path.clone())
            .collect();
        if unfinished.is_empty() {
            return;
        }

        debug!(files = unfinished.len(), "scheduling deletion of unfinished files");
        let attempts = self.inner.config.cleanup_attempts;
        let interval = self.inner.config.cleanup_interval;
        let handle = tokio::spawn(cleanup::delete_with_retries(unfinished, attempts, interval));
        *lock(&self.inner.cleanup) = Some(handle);
    }

    fn unit_snapshot(&self, index: usize) -> Option<TransferUnit> {
        self.lock_files().get(index).cloned()
    }

    fn update_unit(&self, index: usize, f: impl FnOnce(&mut TransferUnit)) -> Option<TransferUnit> {
        let mut files = self.lock_files();
        let unit = files.get_mut(index)?;
        f(unit);
        Some(unit.clone())
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, Vec<TransferUnit>> {
        lock(&self.inner.files)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
