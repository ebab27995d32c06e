//! Display rendering
//!
//! One [`RenderTier`] is active at a time. [`RenderPipeline`] picks it, drives
//! it from the source with a [`RenderLoop`] and downgrades it when the
//! [`HealthMonitor`] reports a stall.

pub mod gpu_tier;
pub mod health;
pub mod pipeline;
pub mod raster;
pub mod raw;
pub mod render_loop;
pub mod surface;
pub mod tier;

pub use gpu_tier::GpuTier;
pub use health::{HealthMonitor, HealthSample, HealthState, HealthStatus};
pub use pipeline::{RenderPipeline, RenderPipelineOptions};
pub use raster::RasterFallbackRenderer;
pub use raw::RawPassthrough;
pub use render_loop::RenderLoop;
pub use surface::{DisplaySurface, FrameBufferSurface};
pub use tier::RenderTier;
