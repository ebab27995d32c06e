//! retrocast capture engine
//!
//! Renders a handheld console's live 160x144 picture through a tiered
//! pipeline (GPU shaders, 2D raster fallback, raw passthrough) and records or
//! screenshots the enhanced output.

pub mod canvas;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod frame;
pub mod macros;
pub mod media;
pub mod recording;
pub mod render;
pub mod shader;
pub mod source;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use coordinator::{CaptureCoordinator, CaptureSettings};
pub use events::EventBus;
pub use frame::{Frame, FrameTracker, VideoFrame};
pub use recording::{RecordingPipeline, RecordingRequest};
pub use render::{RenderPipeline, RenderPipelineOptions};
