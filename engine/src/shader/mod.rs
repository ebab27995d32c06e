//! Shader renderer contract
//!
//! A [`ShaderRenderer`] turns the newest source frame into an enhanced,
//! upscaled bitmap. The display loop and the recording loop share one
//! renderer and may capture from it concurrently.

pub mod presets;

pub use presets::{PresetRegistry, ShaderUniforms, builtin_presets};

use crate::frame::{Frame, VideoFrame};
use async_trait::async_trait;
use common::{Dimensions, PipelineError, ShaderPreset};
use std::sync::Arc;

/// Renderer shared between the display and recording loops
pub type SharedShaderRenderer = Arc<dyn ShaderRenderer>;

#[async_trait]
pub trait ShaderRenderer: Send + Sync {
    /// True while the pipeline can produce frames
    fn is_active(&self) -> bool;

    /// Upload the newest source frame; later captures render from it
    fn submit_source(&self, frame: &VideoFrame) -> Result<(), PipelineError>;

    /// Run one full shader pass and read the result back.
    ///
    /// # Errors
    ///
    /// - `NotActive` when the pipeline is not running
    /// - `DeviceLost` when the GPU device is gone
    /// - `FrameCapture` for transient failures (no source yet, readback failed)
    async fn capture_frame(&self) -> Result<Frame, PipelineError>;

    /// Native resolution multiplied by the configured render scale
    fn target_dimensions(&self) -> Dimensions;

    /// Number of completed captures
    fn progress(&self) -> u64;

    fn set_preset(&self, preset: &ShaderPreset);

    /// Release GPU resources; later captures fail with `NotActive`
    fn shutdown(&self);
}

/// Creates the shader renderer when the stream starts.
///
/// An error means the GPU tier is unavailable and selection moves on to the
/// next tier.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn create(&self) -> Result<SharedShaderRenderer, PipelineError>;
}

/// Factory for builds or machines without a usable GPU
#[derive(Debug, Clone, Default)]
pub struct NoRenderer;

#[async_trait]
impl RendererFactory for NoRenderer {
    async fn create(&self) -> Result<SharedShaderRenderer, PipelineError> {
        Err(PipelineError::DeviceLost("GPU rendering is not available".into()))
    }
}
