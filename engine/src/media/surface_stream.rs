//! Streams derived from a drawing surface

use crate::canvas::Canvas;
use crate::media::{MediaStream, MediaTrack, frame_period};
use common::PipelineError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Samples a shared [`Canvas`] at a fixed rate and publishes the result as a
/// video track, until that track is stopped.
pub struct SurfaceStream;

impl SurfaceStream {
    /// Fails with `InvalidFrameRate` before anything is spawned
    pub fn capture(surface: Arc<Mutex<Canvas>>, frame_rate: u32) -> Result<MediaStream, PipelineError> {
        let period = frame_period(frame_rate)?;
        let (tx, rx) = watch::channel(None);
        let track = MediaTrack::video("surface-capture", rx);
        let lifetime = track.clone();

        let surface_id = surface.lock().id();
        log::debug!(
            "Capturing surface {} at {} fps into track {}",
            surface_id,
            frame_rate,
            track.id()
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let started = tokio::time::Instant::now();
            let mut sampled: u64 = 0;

            loop {
                tokio::select! {
                    _ = lifetime.ended() => break,
                    _ = ticker.tick() => {}
                }

                let frame = surface.lock().to_video_frame(started.elapsed());
                match frame {
                    Ok(frame) => {
                        tx.send_replace(Some(frame));
                        sampled += 1;
                    }
                    Err(e) => log::warn!("Failed to sample surface {}: {}", surface_id, e),
                }
            }

            log::debug!("Surface {} capture ended after {} frames", surface_id, sampled);
        });

        Ok(MediaStream::new(vec![track]))
    }
}
