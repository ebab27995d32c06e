//! Media plumbing around the capture core
//!
//! - `stream`: tracks and streams passed between components
//! - `surface_stream`: streams sampled from a drawing surface
//! - `recorder`: collects a stream into a GIF clip
//! - `sink`: where finished screenshots and clips are saved

pub mod recorder;
pub mod sink;
pub mod stream;
pub mod surface_stream;

pub use recorder::{Clip, ClipLimits, ClipRecorder, FrameRing};
pub use sink::{FileSink, MediaSink, timestamped_filename};
pub use stream::{FrameReceiver, MediaStream, MediaTrack, TrackKind};
pub use surface_stream::SurfaceStream;

use common::PipelineError;
use std::time::Duration;

/// Highest sampling rate accepted for derived streams
pub const MAX_FRAME_RATE: u32 = 240;

/// Tick period for `frame_rate`, rejecting rates outside 1..=[`MAX_FRAME_RATE`]
pub fn frame_period(frame_rate: u32) -> Result<Duration, PipelineError> {
    if !(1..=MAX_FRAME_RATE).contains(&frame_rate) {
        return Err(PipelineError::InvalidFrameRate(frame_rate));
    }
    Ok(Duration::from_nanos(1_000_000_000 / u64::from(frame_rate)))
}
