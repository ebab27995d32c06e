use crate::frame::{Frame, VideoFrame};
use crate::render::surface::DisplaySurface;
use crate::render::tier::RenderTier;
use crate::shader::SharedShaderRenderer;
use async_trait::async_trait;
use common::{Dimensions, PipelineError, RenderMode};
use std::sync::Arc;

/// Renders through the shader pipeline and presents the result
pub struct GpuTier {
    renderer: SharedShaderRenderer,
    display: Arc<dyn DisplaySurface>,
}

impl GpuTier {
    pub fn new(renderer: SharedShaderRenderer, display: Arc<dyn DisplaySurface>) -> Self {
        Self { renderer, display }
    }
}

#[async_trait]
impl RenderTier for GpuTier {
    fn mode(&self) -> RenderMode {
        RenderMode::Gpu
    }

    async fn render(&self, frame: &VideoFrame) -> Result<(), PipelineError> {
        self.renderer.submit_source(frame)?;

        let output = self.renderer.capture_frame().await?;
        let presented = self.display.present(output.pixels(), output.dimensions());
        output.release();
        presented
    }

    async fn capture(&self) -> Result<Frame, PipelineError> {
        self.renderer.capture_frame().await
    }

    fn progress(&self) -> u64 {
        self.renderer.progress()
    }

    fn target_dimensions(&self) -> Dimensions {
        self.renderer.target_dimensions()
    }

    fn shutdown(&self) {
        self.renderer.shutdown();
    }
}
