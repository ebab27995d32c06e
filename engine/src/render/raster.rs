use crate::canvas::Canvas;
use crate::frame::{Frame, VideoFrame};
use crate::render::tier::RenderTier;
use async_trait::async_trait;
use common::{Dimensions, PipelineError, RenderMode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// CPU fallback drawing source frames onto a 2D canvas.
///
/// Frames are upscaled by the integer render scale with nearest-neighbour
/// sampling. The canvas follows the source size if it changes.
pub struct RasterFallbackRenderer {
    canvas: Arc<Mutex<Canvas>>,
    render_scale: u32,
    progress: AtomicU64,
}

impl RasterFallbackRenderer {
    pub fn new(render_scale: u32) -> Result<Self, PipelineError> {
        let render_scale = render_scale.max(1);
        let canvas = Canvas::new(Dimensions::native().scaled(render_scale))?;
        log::debug!("Raster fallback using canvas {}", canvas.id());

        Ok(Self {
            canvas: Arc::new(Mutex::new(canvas)),
            render_scale,
            progress: AtomicU64::new(0),
        })
    }

    /// The drawing surface
    pub fn canvas(&self) -> Arc<Mutex<Canvas>> {
        Arc::clone(&self.canvas)
    }

    pub fn surface_id(&self) -> u64 {
        self.canvas.lock().id()
    }

    /// Draw `frame` scaled to fill the canvas
    pub fn draw(&self, frame: &VideoFrame) -> Result<(), PipelineError> {
        let target = frame.dimensions().scaled(self.render_scale);
        let mut canvas = self.canvas.lock();
        canvas.resize(target)?;
        canvas.draw_video(frame, 0, 0, target)
    }
}

#[async_trait]
impl RenderTier for RasterFallbackRenderer {
    fn mode(&self) -> RenderMode {
        RenderMode::Raster2d
    }

    async fn render(&self, frame: &VideoFrame) -> Result<(), PipelineError> {
        self.draw(frame)?;
        self.progress.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn capture(&self) -> Result<Frame, PipelineError> {
        self.canvas.lock().snapshot()
    }

    fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    fn target_dimensions(&self) -> Dimensions {
        self.canvas.lock().dimensions()
    }

    fn shutdown(&self) {
        log::debug!(
            "Raster fallback stopped after {} frames",
            self.progress.load(Ordering::Relaxed)
        );
    }
}
