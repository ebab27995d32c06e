//! Frame-delivery driven render loop

use crate::media::FrameReceiver;
use crate::render::tier::RenderTier;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Invokes a tier once per newly published source frame.
///
/// The loop wakes on every change of the source's frame channel, skips frames
/// whose timestamp it has already rendered, and only waits for the next frame
/// while the continuation predicate holds.
pub struct RenderLoop {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    rendered: Arc<AtomicU64>,
}

impl RenderLoop {
    pub fn start<P>(mut frames: FrameReceiver, tier: Arc<dyn RenderTier>, should_continue: P) -> Self
    where
        P: Fn() -> bool + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let rendered = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&rendered);

        let handle = tokio::spawn(async move {
            let mode = tier.mode();
            let mut last_timestamp: Option<Duration> = None;
            log::debug!("Render loop started for {} tier", mode);

            while !token.is_cancelled() && should_continue() {
                let latest = frames.borrow_and_update().clone();

                if let Some(frame) = latest.filter(|f| last_timestamp != Some(f.timestamp)) {
                    last_timestamp = Some(frame.timestamp);

                    tokio::select! {
                        _ = token.cancelled() => break,
                        result = tier.render(&frame) => match result {
                            Ok(()) => {
                                counter.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) if e.is_transient() => {
                                log::debug!("Skipped {} frame at {:?}: {}", mode, frame.timestamp, e);
                            }
                            Err(e) => {
                                log::warn!("Failed to render {} frame: {}", mode, e);
                            }
                        }
                    }
                }

                if !should_continue() {
                    break;
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = frames.changed() => {
                        if changed.is_err() {
                            log::debug!("Source stream closed");
                            break;
                        }
                    }
                }
            }

            log::debug!(
                "Render loop for {} tier ended after {} frames",
                mode,
                counter.load(Ordering::Relaxed)
            );
        });

        Self {
            cancel,
            handle: Some(handle),
            rendered,
        }
    }

    /// Cancel the pending wait; idempotent
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.handle.take();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Frames rendered successfully
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
