//! Frame handles passed between the source, the renderers and the recorder
//!
//! - `VideoFrame`: a frame delivered by the live source, cheap to clone
//! - `Frame`: a bitmap produced by a capture; owned by exactly one consumer
//!   and released once the consumer is done drawing it
//! - `FrameTracker`: counts frames that have been handed out but not released

use common::{Dimensions, PipelineError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// A frame published by the live source stream (RGBA8)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation timestamp relative to stream start
    pub timestamp: Duration,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(
        timestamp: Duration,
        width: u32,
        height: u32,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<Self, PipelineError> {
        let dims = Dimensions::new(width, height).validate()?;
        let data = data.into();

        if data.len() != dims.rgba_len() {
            return Err(PipelineError::FrameCapture(format!(
                "Invalid frame data size: expected {} bytes ({} RGBA), got {} bytes",
                dims.rgba_len(),
                dims,
                data.len()
            )));
        }

        Ok(Self {
            timestamp,
            width,
            height,
            data,
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Counts captured frames that are still alive.
///
/// Every `Frame` created through a tracker holds a lease that is returned when
/// the frame is released or dropped.
#[derive(Debug, Clone, Default)]
pub struct FrameTracker {
    outstanding: Arc<AtomicUsize>,
    issued: Arc<AtomicU64>,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lease(&self) -> FrameLease {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.issued.fetch_add(1, Ordering::Relaxed);
        FrameLease {
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Frames handed out and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Total frames ever handed out
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct FrameLease {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A captured RGBA8 bitmap.
///
/// The holder owns the frame for the lifetime of one draw operation and must
/// call [`Frame::release`] afterwards (dropping has the same effect).
#[derive(Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    _lease: Option<FrameLease>,
}

impl Frame {
    /// Create an untracked frame
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, PipelineError> {
        let dims = Dimensions::new(width, height).validate()?;
        if pixels.len() != dims.rgba_len() {
            return Err(PipelineError::FrameCapture(format!(
                "Invalid frame size: expected {} bytes for {}, got {}",
                dims.rgba_len(),
                dims,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
            _lease: None,
        })
    }

    /// Create a frame whose lifetime is counted by `tracker`
    pub fn tracked(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        tracker: &FrameTracker,
    ) -> Result<Self, PipelineError> {
        let mut frame = Self::new(width, height, pixels)?;
        frame._lease = Some(tracker.lease());
        Ok(frame)
    }

    /// Copy a source frame into an owned bitmap
    pub fn from_video(frame: &VideoFrame) -> Result<Self, PipelineError> {
        Self::new(frame.width, frame.height, frame.data.to_vec())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        Some([
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ])
    }

    /// Give the bitmap back to its producer
    pub fn release(self) {
        drop(self);
    }

    /// Encode as PNG for screenshots
    pub fn encode_png(&self) -> Result<Vec<u8>, PipelineError> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| PipelineError::Encode("Frame buffer does not match size".into()))?;

        let mut bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        Ok(bytes.into_inner())
    }
}
