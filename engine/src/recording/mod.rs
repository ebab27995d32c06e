//! Recording of the shader output
//!
//! - `pipeline`: session lifecycle and the per-tick capture loop
//! - `session`: the surface, scale cache and counters owned by one session
//! - `scale`: fitting captured frames into the recording surface
//! - `stats`: periodic recording statistics

pub mod pipeline;
pub mod scale;
pub mod session;
pub mod stats;

pub use pipeline::{RecordingPipeline, RecordingRequest};
pub use scale::{ScaleCache, ScaleParams};
pub use session::{DROPPED_FRAME_THRESHOLD, RecordingSession};
pub use stats::RecordingStats;
