//! Live input sources

use crate::frame::VideoFrame;
use crate::media::{MediaStream, MediaTrack};
use common::{Dimensions, PipelineError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The device's live picture and sound.
///
/// The video track publishes one [`VideoFrame`] per device refresh; renderers
/// subscribe to it through [`FrameSource::stream`].
pub trait FrameSource: Send + Sync {
    /// Live stream handle (one video track, zero or more audio tracks)
    fn stream(&self) -> MediaStream;

    /// Most recently published frame, if any
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Resolution of published frames
    fn dimensions(&self) -> Dimensions;
}

/// Four-shade palette of the original handheld
const PALETTE: [[u8; 4]; 4] = [
    [0xe0, 0xf8, 0xd0, 0xff],
    [0x88, 0xc0, 0x70, 0xff],
    [0x34, 0x68, 0x56, 0xff],
    [0x08, 0x18, 0x20, 0xff],
];

/// Synthetic 160x144 source drawing scrolling diagonal bands
pub struct TestPatternSource {
    tx: Arc<watch::Sender<Option<VideoFrame>>>,
    stream: MediaStream,
    dims: Dimensions,
    frame_interval: Duration,
    published: Arc<AtomicU64>,
    cancel: CancellationToken,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl TestPatternSource {
    pub fn new(frame_rate: u32) -> Self {
        let (tx, rx) = watch::channel(None);
        let stream = MediaStream::new(vec![
            MediaTrack::video("device-video", rx),
            MediaTrack::audio("device-audio"),
        ]);

        Self {
            tx: Arc::new(tx),
            stream,
            dims: Dimensions::native(),
            frame_interval: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            published: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Render pattern frame `n`
    pub fn pattern_frame(dims: Dimensions, n: u64, timestamp: Duration) -> Result<VideoFrame, PipelineError> {
        let dims = dims.validate()?;
        let mut data = Vec::with_capacity(dims.rgba_len());
        for y in 0..dims.height as u64 {
            for x in 0..dims.width as u64 {
                let band = ((x + y + n) / 8) % PALETTE.len() as u64;
                data.extend_from_slice(&PALETTE[band as usize]);
            }
        }
        VideoFrame::new(timestamp, dims.width, dims.height, data)
    }

    /// Publish a frame immediately
    pub fn publish(&self, frame: VideoFrame) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.tx.send_replace(Some(frame));
    }

    /// Publish pattern frame `n` with its nominal timestamp
    pub fn publish_pattern(&self, n: u64) -> Result<(), PipelineError> {
        let frame = Self::pattern_frame(self.dims, n, self.frame_interval * n as u32)?;
        self.publish(frame);
        Ok(())
    }

    /// Frames published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Start publishing at the configured rate
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let tx = Arc::clone(&self.tx);
        let published = Arc::clone(&self.published);
        let cancel = self.cancel.child_token();
        let dims = self.dims;
        let frame_interval = self.frame_interval;

        log::info!(
            "Starting {} test pattern at {:.1} fps",
            dims,
            1.0 / frame_interval.as_secs_f64()
        );

        let run = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut n: u64 = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match Self::pattern_frame(dims, n, frame_interval * n as u32) {
                    Ok(frame) => {
                        tx.send_replace(Some(frame));
                        published.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => log::warn!("Failed to build test pattern frame: {}", e),
                }
                n += 1;
            }

            log::debug!("Test pattern stopped after {} frames", n);
        });
        *task = Some((run, handle));
    }

    pub fn stop(&self) {
        if let Some((cancel, _)) = self.task.lock().take() {
            cancel.cancel();
        }
    }
}

impl FrameSource for TestPatternSource {
    fn stream(&self) -> MediaStream {
        self.stream.clone()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.tx.borrow().clone()
    }

    fn dimensions(&self) -> Dimensions {
        self.dims
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_frame_size_and_palette() {
        let frame = TestPatternSource::pattern_frame(Dimensions::native(), 0, Duration::ZERO).unwrap();
        assert_eq!(frame.dimensions(), Dimensions::native());
        assert_eq!(&frame.data[0..4], &PALETTE[0]);

        // x = 8 falls into the second band
        let idx = 8 * 4;
        assert_eq!(&frame.data[idx..idx + 4], &PALETTE[1]);
    }

    #[test]
    fn test_pattern_scrolls() {
        let a = TestPatternSource::pattern_frame(Dimensions::native(), 0, Duration::ZERO).unwrap();
        let b = TestPatternSource::pattern_frame(Dimensions::native(), 4, Duration::ZERO).unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_stream_has_video_and_audio() {
        let source = TestPatternSource::new(60);
        let stream = source.stream();
        assert_eq!(stream.video_tracks().count(), 1);
        assert_eq!(stream.audio_tracks().count(), 1);
        assert!(source.latest_frame().is_none());
    }

    #[test]
    fn test_publish_updates_receivers() {
        let source = TestPatternSource::new(60);
        let rx = source.stream().video_frames().unwrap();

        source.publish_pattern(3).unwrap();
        assert_eq!(source.published(), 1);

        let latest = rx.borrow().clone().unwrap();
        assert_eq!(latest.timestamp, source.frame_interval * 3);
        assert_eq!(
            source.latest_frame().map(|f| f.timestamp),
            Some(latest.timestamp)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_publishes_at_rate() {
        let source = TestPatternSource::new(10);
        source.start();

        tokio::time::sleep(Duration::from_millis(450)).await;
        source.stop();

        // Ticks at 0, 100, 200, 300 and 400 ms
        assert_eq!(source.published(), 5);

        source.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.published(), 6);
        source.stop();
    }
}
