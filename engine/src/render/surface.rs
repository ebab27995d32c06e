//! Display surfaces the render tiers present to

use crate::canvas::next_surface_id;
use crate::frame::Frame;
use common::{Dimensions, PipelineError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Where rendered pictures end up on screen
pub trait DisplaySurface: Send + Sync {
    fn id(&self) -> u64;

    /// Show a tightly packed RGBA8 image
    fn present(&self, pixels: &[u8], dims: Dimensions) -> Result<(), PipelineError>;

    /// Size of the last presented image
    fn dimensions(&self) -> Option<Dimensions>;
}

/// Off-screen surface that keeps the last presented image
#[derive(Debug)]
pub struct FrameBufferSurface {
    id: u64,
    latest: Mutex<Option<Frame>>,
    presented: AtomicU64,
}

impl FrameBufferSurface {
    pub fn new() -> Self {
        Self {
            id: next_surface_id(),
            latest: Mutex::new(None),
            presented: AtomicU64::new(0),
        }
    }

    /// Images presented so far
    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    /// Copy of the last presented image
    pub fn snapshot(&self) -> Option<Frame> {
        let latest = self.latest.lock();
        latest
            .as_ref()
            .and_then(|f| Frame::new(f.width(), f.height(), f.pixels().to_vec()).ok())
    }
}

impl Default for FrameBufferSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for FrameBufferSurface {
    fn id(&self) -> u64 {
        self.id
    }

    fn present(&self, pixels: &[u8], dims: Dimensions) -> Result<(), PipelineError> {
        let frame = Frame::new(dims.width, dims.height, pixels.to_vec())?;
        *self.latest.lock() = Some(frame);
        self.presented.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.latest.lock().as_ref().map(Frame::dimensions)
    }
}
