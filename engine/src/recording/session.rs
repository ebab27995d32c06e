use crate::canvas::{Canvas, OPAQUE_BLACK};
use crate::frame::Frame;
use crate::recording::scale::ScaleCache;
use crate::recording::stats::RecordingStats;
use common::{Dimensions, PipelineError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Dropped frames that make up one `recording-degraded` report
pub const DROPPED_FRAME_THRESHOLD: u32 = 30;

/// State owned by one active recording.
///
/// Dropping the session releases the surface and every counter with it.
#[derive(Debug)]
pub struct RecordingSession {
    surface: Arc<Mutex<Canvas>>,
    target: Dimensions,
    scale_cache: ScaleCache,
    /// Bars were painted black since the last dimension change
    cleared: bool,
    dropped_frames: u32,
    stats: RecordingStats,
}

impl RecordingSession {
    pub fn new(surface: Arc<Mutex<Canvas>>, target_fps: u32) -> Self {
        let target = surface.lock().dimensions();
        Self {
            surface,
            target,
            scale_cache: ScaleCache::new(),
            cleared: false,
            dropped_frames: 0,
            stats: RecordingStats::new(target_fps),
        }
    }

    pub fn surface(&self) -> &Arc<Mutex<Canvas>> {
        &self.surface
    }

    /// Failures since the last degraded report
    pub fn dropped_frames(&self) -> u32 {
        self.dropped_frames
    }

    pub fn stats(&self) -> &RecordingStats {
        &self.stats
    }

    /// Fit `frame` onto the surface, painting the bars black once per size
    pub fn draw(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        let (params, recomputed) = self.scale_cache.lookup(frame.dimensions(), self.target)?;
        if recomputed {
            self.cleared = false;
        }

        let mut surface = self.surface.lock();
        if params.needs_clearing && !self.cleared {
            surface.fill(OPAQUE_BLACK);
            self.cleared = true;
        }

        surface.draw_frame(
            frame,
            params.offset_x as i64,
            params.offset_y as i64,
            params.draw_dimensions(),
        )
    }

    pub fn record_success(&mut self) {
        self.stats.increment_drawn();
    }

    /// Count a failed tick.
    ///
    /// Returns the batch size when the threshold is reached; the counter then
    /// starts over. Successful ticks in between do not reset it.
    pub fn record_drop(&mut self) -> Option<u32> {
        self.stats.increment_dropped();
        self.dropped_frames += 1;

        if self.dropped_frames >= DROPPED_FRAME_THRESHOLD {
            let count = self.dropped_frames;
            self.dropped_frames = 0;
            Some(count)
        } else {
            None
        }
    }

    pub fn record_skip(&mut self) {
        self.stats.increment_skipped();
    }

    pub fn maybe_log_stats(&mut self) {
        self.stats
            .maybe_log_stats(crate::recording::stats::STATS_LOG_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(target: Dimensions) -> RecordingSession {
        let canvas = Canvas::new(target).unwrap();
        RecordingSession::new(Arc::new(Mutex::new(canvas)), 60)
    }

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Frame {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Frame::new(width, height, pixels).unwrap()
    }

    #[test]
    fn test_letterboxed_frame_is_centered() {
        let mut session = session(Dimensions::new(8, 8));
        session.draw(&solid(4, 2, [255, 0, 0, 255])).unwrap();

        let surface = session.surface().lock();
        assert_eq!(surface.pixel(0, 0), Some(OPAQUE_BLACK));
        assert_eq!(surface.pixel(0, 2), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(7, 5), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(7, 6), Some(OPAQUE_BLACK));
    }

    #[test]
    fn test_clears_once_per_dimension_change() {
        let mut session = session(Dimensions::new(8, 8));
        session.draw(&solid(4, 2, [255, 0, 0, 255])).unwrap();

        // Paint a bar pixel; a repeat draw of the same size must not clear it
        session.surface().lock().draw_rgba(
            &[0, 255, 0, 255],
            Dimensions::new(1, 1),
            0,
            0,
            Dimensions::new(1, 1),
        ).unwrap();
        session.draw(&solid(4, 2, [255, 0, 0, 255])).unwrap();
        assert_eq!(session.surface().lock().pixel(0, 0), Some([0, 255, 0, 255]));

        session.draw(&solid(2, 4, [0, 0, 255, 255])).unwrap();
        assert_eq!(session.surface().lock().pixel(0, 0), Some(OPAQUE_BLACK));
    }

    #[test]
    fn test_full_size_frame_skips_clearing() {
        let mut session = session(Dimensions::new(4, 4));
        session.draw(&solid(2, 2, [9, 9, 9, 255])).unwrap();

        let surface = session.surface().lock();
        assert_eq!(surface.pixel(0, 0), Some([9, 9, 9, 255]));
        assert_eq!(surface.pixel(3, 3), Some([9, 9, 9, 255]));
    }

    #[test]
    fn test_drop_threshold_reports_and_resets() {
        let mut session = session(Dimensions::new(4, 4));

        for _ in 0..DROPPED_FRAME_THRESHOLD - 1 {
            assert_eq!(session.record_drop(), None);
        }
        session.record_success();
        assert_eq!(session.dropped_frames(), DROPPED_FRAME_THRESHOLD - 1);

        assert_eq!(session.record_drop(), Some(DROPPED_FRAME_THRESHOLD));
        assert_eq!(session.dropped_frames(), 0);
        assert_eq!(session.stats().frames_dropped(), DROPPED_FRAME_THRESHOLD as u64);
        assert_eq!(session.stats().frames_drawn(), 1);
    }
}
