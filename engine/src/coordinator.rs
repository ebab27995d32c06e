//! User-facing screenshot and recording commands
//!
//! The coordinator is the error boundary of the engine: every failure ends
//! up as a `status` or `recording-error` notification on the event bus and
//! nothing is returned to the caller as an error.

use crate::config::RecordingSettings;
use crate::events::EventBus;
use crate::frame::Frame;
use crate::media::{Clip, ClipLimits, ClipRecorder, MediaSink, MediaStream, SurfaceStream, timestamped_filename};
use crate::recording::{RecordingPipeline, RecordingRequest};
use crate::render::RenderPipeline;
use common::{PipelineError, PipelineEvent, RenderMode};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

const SCREENSHOT_EXTENSION: &str = "png";

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub frame_rate: u32,
    pub file_prefix: String,
    /// Bounds of a clip; older frames are discarded past them
    pub clip_limits: ClipLimits,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from_recording(&RecordingSettings::default())
    }
}

impl CaptureSettings {
    pub fn from_recording(settings: &RecordingSettings) -> Self {
        Self {
            frame_rate: settings.frame_rate,
            file_prefix: settings.file_prefix.clone(),
            clip_limits: ClipLimits {
                max_bytes: settings.max_clip_mb.saturating_mul(1024 * 1024),
                ..ClipLimits::default()
            },
        }
    }
}

/// A clip being collected
struct ActiveCapture {
    id: u64,
    recorder: ClipRecorder,
    resources: CaptureResources,
}

/// What feeds the recorder, released once the clip is collected
struct CaptureResources {
    /// Set when recording the shader output
    pipeline: Option<RecordingPipeline>,
    /// Stream sampled from the raster canvas
    surface_stream: Option<MediaStream>,
    /// Stops the task that ends the clip when the tier changes
    tier_watch: CancellationToken,
}

impl CaptureResources {
    fn release(self) {
        self.tier_watch.cancel();
        if let Some(pipeline) = self.pipeline {
            pipeline.dispose();
        }
        if let Some(stream) = self.surface_stream {
            stream.stop_all();
        }
    }
}

struct CoordinatorInner {
    pipeline: RenderPipeline,
    sink: Arc<dyn MediaSink>,
    events: EventBus,
    settings: CaptureSettings,
    recording: tokio::sync::Mutex<Option<ActiveCapture>>,
    next_recording: AtomicU64,
}

/// Screenshot and recording commands over a [`RenderPipeline`]
pub struct CaptureCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl CaptureCoordinator {
    pub fn new(pipeline: RenderPipeline, sink: Arc<dyn MediaSink>, settings: CaptureSettings) -> Self {
        let events = pipeline.events().clone();
        Self {
            inner: Arc::new(CoordinatorInner {
                pipeline,
                sink,
                events,
                settings,
                recording: tokio::sync::Mutex::new(None),
                next_recording: AtomicU64::new(1),
            }),
        }
    }

    /// Save a PNG of what is on screen.
    ///
    /// Returns where it was saved, or `None` after reporting the failure.
    pub async fn take_screenshot(&self) -> Option<PathBuf> {
        let inner = &self.inner;
        match inner.save_screenshot().await {
            Ok((filename, path)) => {
                inner.events.emit(PipelineEvent::ScreenshotSaved { filename });
                crate::emit_status!(inner.events, Info, "Screenshot saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                crate::emit_status!(inner.events, Error, "Screenshot failed: {}", e);
                None
            }
        }
    }

    /// Start recording, or stop and save the running recording.
    ///
    /// Returns whether a recording is running afterwards.
    pub async fn toggle_recording(&self) -> bool {
        let inner = &self.inner;
        let mut recording = inner.recording.lock().await;

        if let Some(active) = recording.take() {
            inner.finish_recording(active).await;
            return false;
        }

        match inner.begin_recording().await {
            Ok(active) => {
                *recording = Some(active);
                inner.events.emit(PipelineEvent::RecordingStarted);
                crate::emit_status!(inner.events, Info, "Recording started");
                true
            }
            Err(e) => {
                inner.events.emit(PipelineEvent::RecordingError {
                    reason: e.to_string(),
                });
                crate::emit_status!(inner.events, Error, "Failed to start recording: {}", e);
                false
            }
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.recording.lock().await.is_some()
    }

    /// Finish and save a running recording
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if let Some(active) = inner.recording.lock().await.take() {
            log::info!("Finishing recording before shutdown");
            inner.finish_recording(active).await;
        }
    }
}

impl CoordinatorInner {
    /// Capture by priority: shader output, raster canvas, then the raw source
    async fn capture_screen(&self) -> Result<Frame, PipelineError> {
        match self.pipeline.active_mode() {
            Some(RenderMode::Gpu) => match self.pipeline.shader_renderer().await {
                Some(renderer) => renderer.capture_frame().await,
                None => Err(PipelineError::NotActive("Shader pipeline".into())),
            },
            Some(RenderMode::Raster2d) => match self.pipeline.raster_canvas().await {
                Some(canvas) => canvas.lock().snapshot(),
                None => Err(PipelineError::NotActive("Raster renderer".into())),
            },
            Some(RenderMode::Raw) | None => {
                let latest = self.pipeline.source().latest_frame();
                latest
                    .ok_or(PipelineError::NoSource)
                    .and_then(|frame| Frame::from_video(&frame))
            }
        }
    }

    async fn save_screenshot(&self) -> Result<(String, PathBuf), PipelineError> {
        let frame = self.capture_screen().await?;
        let dims = frame.dimensions();

        let bytes = tokio::task::spawn_blocking(move || {
            let encoded = frame.encode_png();
            frame.release();
            encoded
        })
        .await
        .map_err(|e| PipelineError::Encode(format!("PNG encoder task failed: {}", e)))??;

        let filename = timestamped_filename(&self.settings.file_prefix, SCREENSHOT_EXTENSION);
        log::debug!("Encoded {} screenshot ({} bytes)", dims, bytes.len());
        let path = self.sink.encode_and_save(bytes, &filename).await?;
        Ok((filename, path))
    }

    async fn begin_recording(self: &Arc<Self>) -> Result<ActiveCapture, PipelineError> {
        // Subscribed first so a tier change right after the mode check is seen
        let tier_events = self.events.subscribe();
        let source = self.pipeline.source().stream();
        let frame_rate = self.settings.frame_rate;
        let limits = self.settings.clip_limits;
        let mode = self.pipeline.active_mode();

        let (recorder, pipeline, surface_stream) = match mode {
            Some(RenderMode::Gpu) => {
                let renderer = self
                    .pipeline
                    .shader_renderer()
                    .await
                    .ok_or_else(|| PipelineError::NotActive("Shader pipeline".into()))?;

                let recording = RecordingPipeline::new(renderer, self.events.clone());
                let output = recording.start(RecordingRequest {
                    source: Some(source),
                    target_frame_rate: frame_rate,
                })?;

                // Dropping the pipeline on error disposes it
                let recorder = ClipRecorder::start(&output, limits)?;
                (recorder, Some(recording), None)
            }
            Some(RenderMode::Raster2d) => {
                let canvas = self
                    .pipeline
                    .raster_canvas()
                    .await
                    .ok_or_else(|| PipelineError::NotActive("Raster renderer".into()))?;

                let stream = SurfaceStream::capture(canvas, frame_rate)?;
                match ClipRecorder::start(&stream, limits) {
                    Ok(recorder) => (recorder, None, Some(stream)),
                    Err(e) => {
                        stream.stop_all();
                        return Err(e);
                    }
                }
            }
            Some(RenderMode::Raw) | None => (ClipRecorder::start(&source, limits)?, None, None),
        };

        let id = self.next_recording.fetch_add(1, Ordering::Relaxed);
        let tier_watch = CancellationToken::new();

        // The raw source outlives tier changes; the shader and canvas do not
        if matches!(mode, Some(RenderMode::Gpu | RenderMode::Raster2d)) {
            tokio::spawn(end_on_tier_change(
                Arc::downgrade(self),
                tier_events,
                id,
                mode,
                tier_watch.clone(),
            ));
        }

        Ok(ActiveCapture {
            id,
            recorder,
            resources: CaptureResources {
                pipeline,
                surface_stream,
                tier_watch,
            },
        })
    }

    async fn finish_recording(&self, active: ActiveCapture) {
        let ActiveCapture { recorder, resources, .. } = active;

        // Frames already collected stay in the recorder
        resources.release();
        let clip = recorder.finish().await;
        self.events.emit(PipelineEvent::RecordingStopped);

        let saved = match clip {
            Ok(clip) => self.save_clip(clip).await,
            Err(e) => Err(e),
        };

        if let Err(e) = saved {
            self.events.emit(PipelineEvent::RecordingError {
                reason: e.to_string(),
            });
            crate::emit_status!(self.events, Error, "Failed to save recording: {}", e);
        }
    }

    async fn save_clip(&self, clip: Clip) -> Result<(), PipelineError> {
        let filename = timestamped_filename(&self.settings.file_prefix, Clip::EXTENSION);
        let size_bytes = clip.size_bytes();
        log::info!(
            "Encoded {} frame clip ({:.1}s, {} bytes)",
            clip.frame_count,
            clip.duration.as_secs_f64(),
            size_bytes
        );

        let path = self.sink.encode_and_save(clip.bytes, &filename).await?;
        crate::emit_status!(self.events, Info, "Recording saved to {}", path.display());
        self.events.emit(PipelineEvent::RecordingReady {
            filename,
            size_bytes,
        });
        Ok(())
    }
}

/// Ends recording `id` once the tier it records from is replaced.
///
/// The clip keeps the frames collected up to the change and is saved as if
/// the recording had been toggled off.
async fn end_on_tier_change(
    coordinator: Weak<CoordinatorInner>,
    mut events: broadcast::Receiver<PipelineEvent>,
    id: u64,
    recorded: Option<RenderMode>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(PipelineEvent::ModeChanged { .. }) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                log::debug!("Tier watch lagged by {} events", skipped);
                let Some(inner) = coordinator.upgrade() else {
                    return;
                };
                if inner.pipeline.active_mode() != recorded {
                    break;
                }
            }
            Err(RecvError::Closed) => return,
        }
    }

    let Some(inner) = coordinator.upgrade() else {
        return;
    };
    let mut recording = inner.recording.lock().await;
    if !recording.as_ref().is_some_and(|active| active.id == id) {
        return;
    }

    if let Some(active) = recording.take() {
        crate::emit_status!(
            inner.events,
            Warning,
            "Rendering tier was replaced, ending the recording"
        );
        inner.finish_recording(active).await;
    }
}
