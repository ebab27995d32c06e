//! Recording loop statistics
//!
//! Counts drawn, dropped and skipped ticks for the periodic stats log line.
//! The dropped-frame batch counter that drives `recording-degraded` lives on
//! the session; these totals are never reset while a session runs.

use std::time::{Duration, Instant};

/// Interval between stats log lines
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub struct RecordingStats {
    /// Frames drawn onto the recording surface
    pub(super) frames_drawn: u64,

    /// Ticks whose capture or draw failed
    pub(super) frames_dropped: u64,

    /// Ticks skipped because the previous capture was still pending
    pub(super) ticks_skipped: u64,

    /// Requested output frame rate
    pub(super) target_fps: u32,

    pub(super) started: Instant,

    pub(super) last_stats_log: Instant,
}

impl RecordingStats {
    pub fn new(target_fps: u32) -> Self {
        let now = Instant::now();
        Self {
            frames_drawn: 0,
            frames_dropped: 0,
            ticks_skipped: 0,
            target_fps,
            started: now,
            last_stats_log: now,
        }
    }

    pub fn increment_drawn(&mut self) {
        self.frames_drawn += 1;
    }

    pub fn increment_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    pub fn increment_skipped(&mut self) {
        self.ticks_skipped += 1;
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped
    }

    /// Dropped frames as a percentage of all attempted frames
    pub fn drop_rate(&self) -> f64 {
        let total = self.frames_drawn + self.frames_dropped;
        if total == 0 {
            0.0
        } else {
            (self.frames_dropped as f64 / total as f64) * 100.0
        }
    }

    /// Log statistics if interval has elapsed
    pub fn maybe_log_stats(&mut self, interval: Duration) {
        if self.last_stats_log.elapsed() < interval {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.frames_drawn as f64 / elapsed
        } else {
            0.0
        };

        log::info!(
            "Recording stats ({:.1}/{} fps): {} drawn, {} dropped ({:.1}% drop rate), {} ticks skipped",
            fps,
            self.target_fps,
            self.frames_drawn,
            self.frames_dropped,
            self.drop_rate(),
            self.ticks_skipped
        );

        self.last_stats_log = Instant::now();
    }
}
