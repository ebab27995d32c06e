use crate::canvas::Canvas;
use crate::events::EventBus;
use crate::media::{MediaStream, SurfaceStream, frame_period};
use crate::recording::session::RecordingSession;
use crate::shader::SharedShaderRenderer;
use common::{PipelineError, PipelineEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Parameters for [`RecordingPipeline::start`]
#[derive(Debug, Clone)]
pub struct RecordingRequest {
    /// Live source stream; its audio tracks are carried into the recording
    pub source: Option<MediaStream>,
    pub target_frame_rate: u32,
}

struct ActiveRecording {
    session: Arc<Mutex<RecordingSession>>,
    output: MediaStream,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Records the shader output into a stream of its own.
///
/// Each session draws shader captures onto an off-screen canvas on a fixed
/// tick and exposes that canvas as a video stream, together with clones of
/// the source's audio tracks. The loop is independent of the display loop and
/// shares only the shader renderer with it.
pub struct RecordingPipeline {
    renderer: SharedShaderRenderer,
    events: EventBus,
    active: Mutex<Option<ActiveRecording>>,
}

impl RecordingPipeline {
    pub fn new(renderer: SharedShaderRenderer, events: EventBus) -> Self {
        Self {
            renderer,
            events,
            active: Mutex::new(None),
        }
    }

    /// Start a session and return the stream it produces.
    ///
    /// # Errors
    ///
    /// - `AlreadyActive` when a session is running; that session is untouched
    /// - `NoSource` when the request carries no source stream
    /// - `InvalidFrameRate` when the rate is outside 1..=240
    /// - `InvalidDimensions` when the renderer reports an empty target
    pub fn start(&self, request: RecordingRequest) -> Result<MediaStream, PipelineError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(PipelineError::AlreadyActive("Recording pipeline".into()));
        }

        let source = request.source.ok_or(PipelineError::NoSource)?;
        let frame_rate = request.target_frame_rate;
        let period = frame_period(frame_rate)?;
        let target = self.renderer.target_dimensions().validate()?;

        let surface = Arc::new(Mutex::new(Canvas::new(target)?));
        let mut output = SurfaceStream::capture(Arc::clone(&surface), frame_rate)?;
        for track in source.audio_tracks() {
            output.add_track(track.clone_track());
        }

        let session = Arc::new(Mutex::new(RecordingSession::new(surface, frame_rate)));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.renderer),
            Arc::clone(&session),
            self.events.clone(),
            cancel.clone(),
            period,
        ));

        log::info!(
            "Recording started: {} at {} fps, {} audio tracks",
            target,
            frame_rate,
            output.audio_tracks().count()
        );

        *active = Some(ActiveRecording {
            session,
            output: output.clone(),
            cancel,
            task,
        });
        Ok(output)
    }

    /// End the session; idempotent.
    ///
    /// Captures still in flight finish but their results are discarded.
    pub fn stop(&self) {
        let Some(recording) = self.active.lock().take() else {
            return;
        };

        recording.cancel.cancel();
        recording.output.stop_all();

        let session = recording.session.lock();
        log::info!(
            "Recording stopped: {} frames drawn, {} dropped, {} ticks skipped",
            session.stats().frames_drawn(),
            session.stats().frames_dropped(),
            session.stats().ticks_skipped()
        );
        drop(session);
        drop(recording.task);
    }

    /// Same as [`stop`](Self::stop)
    pub fn dispose(&self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Failures counted toward the next degraded report, 0 when idle
    pub fn dropped_frames(&self) -> u32 {
        self.active
            .lock()
            .as_ref()
            .map_or(0, |r| r.session.lock().dropped_frames())
    }

    /// Frames drawn by the current session, 0 when idle
    pub fn frames_drawn(&self) -> u64 {
        self.active
            .lock()
            .as_ref()
            .map_or(0, |r| r.session.lock().stats().frames_drawn())
    }

    /// The recording surface of the current session
    pub fn surface(&self) -> Option<Arc<Mutex<Canvas>>> {
        self.active
            .lock()
            .as_ref()
            .map(|r| Arc::clone(r.session.lock().surface()))
    }
}

impl Drop for RecordingPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clears the re-entrancy flag when the capture finishes, on every path
struct PendingCapture(Arc<AtomicBool>);

impl PendingCapture {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(Arc::clone(flag)))
        }
    }
}

impl Drop for PendingCapture {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn run_loop(
    renderer: SharedShaderRenderer,
    session: Arc<Mutex<RecordingSession>>,
    events: EventBus,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let pending = Arc::new(AtomicBool::new(false));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(guard) = PendingCapture::acquire(&pending) else {
            session.lock().record_skip();
            continue;
        };

        tokio::spawn(capture_tick(
            Arc::clone(&renderer),
            Arc::clone(&session),
            events.clone(),
            cancel.clone(),
            guard,
        ));

        session.lock().maybe_log_stats();
    }

    log::debug!("Recording loop ended");
}

/// One capture, fit and draw; never fails the loop
async fn capture_tick(
    renderer: SharedShaderRenderer,
    session: Arc<Mutex<RecordingSession>>,
    events: EventBus,
    cancel: CancellationToken,
    _pending: PendingCapture,
) {
    let captured = renderer.capture_frame().await;

    if cancel.is_cancelled() {
        if let Ok(frame) = captured {
            frame.release();
        }
        log::trace!("Discarding capture completed after recording stopped");
        return;
    }

    let mut session = session.lock();
    let result = captured.and_then(|frame| {
        let drawn = session.draw(&frame);
        frame.release();
        drawn
    });

    match result {
        Ok(()) => session.record_success(),
        Err(e) => {
            match &e {
                PipelineError::InvalidDimensions { .. } => {
                    log::warn!("Skipping recording frame: {}", e)
                }
                _ => log::debug!("Recording frame dropped: {}", e),
            }

            if let Some(dropped_frames) = session.record_drop() {
                drop(session);
                log::warn!("Recording degraded: {} frames dropped", dropped_frames);
                events.emit(PipelineEvent::RecordingDegraded { dropped_frames });
            }
        }
    }
}
