//! Capability interface shared by the rendering tiers

use crate::frame::{Frame, VideoFrame};
use async_trait::async_trait;
use common::{Dimensions, PipelineError, RenderMode};

/// One rendering strategy: GPU shader pipeline, 2D raster or raw passthrough.
///
/// The render pipeline holds exactly one tier at a time and only looks at
/// [`RenderTier::mode`] when choosing the next one.
#[async_trait]
pub trait RenderTier: Send + Sync {
    fn mode(&self) -> RenderMode;

    /// Draw one source frame to the display
    async fn render(&self, frame: &VideoFrame) -> Result<(), PipelineError>;

    /// Capture what the tier currently shows
    async fn capture(&self) -> Result<Frame, PipelineError>;

    /// Monotonic counter of completed renders, used for stall detection
    fn progress(&self) -> u64;

    fn target_dimensions(&self) -> Dimensions;

    fn shutdown(&self);
}
