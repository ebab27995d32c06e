//! Stream recorder producing animated GIF clips

use crate::frame::VideoFrame;
use crate::media::{FrameReceiver, MediaStream};
use common::PipelineError;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, RgbaImage};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Frames kept by default (about 15 s at 60 fps)
pub const DEFAULT_MAX_FRAMES: usize = 900;

/// Pixel memory a clip may hold before old frames are discarded
pub const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;

const FALLBACK_DELAY: Duration = Duration::from_millis(16);

/// A finished, encoded recording
#[derive(Debug, Clone)]
pub struct Clip {
    pub bytes: Vec<u8>,
    pub frame_count: usize,
    pub duration: Duration,
}

impl Clip {
    pub const EXTENSION: &'static str = "gif";

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// How much of a stream a clip keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipLimits {
    pub max_frames: usize,
    pub max_bytes: usize,
}

impl Default for ClipLimits {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Newest frames of a recording, bounded by count and by pixel bytes.
///
/// The newest frame is always kept, even when it alone exceeds the byte budget.
#[derive(Debug)]
pub struct FrameRing {
    frames: VecDeque<VideoFrame>,
    bytes: usize,
    limits: ClipLimits,
    evicted: u64,
}

impl FrameRing {
    pub fn new(limits: ClipLimits) -> Self {
        Self {
            frames: VecDeque::new(),
            bytes: 0,
            limits: ClipLimits {
                max_frames: limits.max_frames.max(1),
                max_bytes: limits.max_bytes,
            },
            evicted: 0,
        }
    }

    pub fn push(&mut self, frame: VideoFrame) {
        self.bytes += frame.data.len();
        self.frames.push_back(frame);

        while self.frames.len() > 1
            && (self.frames.len() > self.limits.max_frames || self.bytes > self.limits.max_bytes)
        {
            if let Some(old) = self.frames.pop_front() {
                self.bytes -= old.data.len();
                self.evicted += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Pixel bytes currently held
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn into_frames(self) -> Vec<VideoFrame> {
        self.frames.into()
    }
}

/// Collects frames from a stream's video track into a [`FrameRing`]
pub struct ClipRecorder {
    cancel: CancellationToken,
    task: JoinHandle<FrameRing>,
}

impl ClipRecorder {
    pub fn start(stream: &MediaStream, limits: ClipLimits) -> Result<Self, PipelineError> {
        let track = stream
            .video_tracks()
            .find(|t| t.is_live())
            .cloned()
            .ok_or(PipelineError::NoSource)?;
        let mut frames = track.frames().ok_or(PipelineError::NoSource)?;

        // Frames published before this call are not part of the clip; anything
        // sent from here on is seen by the task however late it is first polled
        let _ = frames.borrow_and_update();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let mut ring = FrameRing::new(limits);

        log::info!(
            "Recording track {} ({}), keeping up to {} frames / {} MiB",
            track.id(),
            track.label(),
            ring.limits.max_frames,
            ring.limits.max_bytes / (1024 * 1024)
        );

        let task = tokio::spawn(async move {
            let mut last_timestamp = None;
            let mut keep = |frames: &mut FrameReceiver, ring: &mut FrameRing| {
                let Some(frame) = frames.borrow_and_update().clone() else {
                    return;
                };
                if last_timestamp != Some(frame.timestamp) {
                    last_timestamp = Some(frame.timestamp);
                    ring.push(frame);
                }
            };

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = track.ended() => break,
                    changed = frames.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                keep(&mut frames, &mut ring);
            }

            // A frame sent just before the stop is still part of the clip
            if frames.has_changed().unwrap_or(false) {
                keep(&mut frames, &mut ring);
            }

            if ring.evicted() > 0 {
                log::debug!(
                    "Recorder discarded {} old frames, keeping {} ({} bytes)",
                    ring.evicted(),
                    ring.len(),
                    ring.bytes()
                );
            }
            ring
        });

        Ok(Self { cancel, task })
    }

    /// Stop collecting and encode the clip
    pub async fn finish(self) -> Result<Clip, PipelineError> {
        self.cancel.cancel();
        let ring = self
            .task
            .await
            .map_err(|e| PipelineError::Encode(format!("Recorder task failed: {}", e)))?;

        if ring.is_empty() {
            return Err(PipelineError::Encode("No frames were recorded".into()));
        }

        let frames = ring.into_frames();
        tokio::task::spawn_blocking(move || encode_gif(&frames))
            .await
            .map_err(|e| PipelineError::Encode(format!("Encoder task failed: {}", e)))?
    }
}

/// Encode frames as an infinitely looping GIF
pub fn encode_gif(frames: &[VideoFrame]) -> Result<Clip, PipelineError> {
    let mut bytes = Vec::new();
    let mut duration = Duration::ZERO;

    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;

        for (i, frame) in frames.iter().enumerate() {
            let delay = frames
                .get(i + 1)
                .map(|next| next.timestamp.saturating_sub(frame.timestamp))
                .filter(|d| !d.is_zero())
                .unwrap_or(FALLBACK_DELAY);
            duration += delay;

            let image = RgbaImage::from_raw(frame.width, frame.height, frame.data.to_vec())
                .ok_or_else(|| PipelineError::Encode("Frame buffer does not match size".into()))?;

            let gif_frame = image::Frame::from_parts(
                image,
                0,
                0,
                Delay::from_numer_denom_ms(delay.as_millis() as u32, 1),
            );
            encoder
                .encode_frame(gif_frame)
                .map_err(|e| PipelineError::Encode(e.to_string()))?;
        }
    }

    log::debug!(
        "Encoded {} frames ({:?}) into {} bytes",
        frames.len(),
        duration,
        bytes.len()
    );

    Ok(Clip {
        bytes,
        frame_count: frames.len(),
        duration,
    })
}
