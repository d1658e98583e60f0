//! Windowed throughput sampling for the transfer loop.
//!
//! The estimator counts chunks rather than bytes: every `cycles` chunks it
//! computes `chunk_size * cycles * 1000 / elapsed_ms` and opens a new window.
//! This gives a smoothed recent rate instead of a lifetime average.

use std::time::{Duration, Instant};

/// Chunk-counting speed sampler.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    chunk_size: u64,
    cycles: u32,
    readings: u32,
    window_start: Instant,
    speed: u64,
}

impl SpeedEstimator {
    /// Creates an estimator for `chunk_size`-byte reads sampled every `cycles` chunks.
    ///
    /// A `cycles` value of zero is treated as one.
    #[must_use]
    pub fn new(chunk_size: usize, cycles: u32) -> Self {
        Self {
            chunk_size: chunk_size as u64,
            cycles: cycles.max(1),
            readings: 0,
            window_start: Instant::now(),
            speed: 0,
        }
    }

    /// Records one chunk read; returns the new speed when a window closes.
    pub fn record_chunk(&mut self) -> Option<u64> {
        self.record_chunk_at(Instant::now())
    }

    fn record_chunk_at(&mut self, now: Instant) -> Option<u64> {
        self.readings += 1;
        if self.readings < self.cycles {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.window_start);
        self.speed = Self::compute(self.chunk_size, self.cycles, elapsed);
        self.readings = 0;
        self.window_start = now;
        Some(self.speed)
    }

    /// Discards the current window (used after a pause so idle time is not sampled).
    pub fn restart_window(&mut self) {
        self.readings = 0;
        self.window_start = Instant::now();
    }

    /// Last computed speed in bytes per second.
    #[must_use]
    pub fn speed(&self) -> u64 {
        self.speed
    }

    fn compute(chunk_size: u64, cycles: u32, elapsed: Duration) -> u64 {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX).max(1);
        chunk_size
            .saturating_mul(u64::from(cycles))
            .saturating_mul(1000)
            / millis
    }
}

/// Time left for `total - transferred` bytes at `speed` bytes per second.
#[must_use]
pub fn eta_for(speed: u64, total: u64, transferred: u64) -> Option<Duration> {
    if speed == 0 || total == 0 {
        return None;
    }
    let remaining = total.saturating_sub(transferred);
    Some(Duration::from_secs(remaining.div_ceil(speed)))
}
