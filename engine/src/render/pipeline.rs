//! Render tier selection and the stall-driven downgrade state machine

use crate::canvas::Canvas;
use crate::config::{Config, HealthSettings};
use crate::events::EventBus;
use crate::frame::Frame;
use crate::render::gpu_tier::GpuTier;
use crate::render::health::{HealthMonitor, HealthOutcome, HealthSample};
use crate::render::raster::RasterFallbackRenderer;
use crate::render::raw::RawPassthrough;
use crate::render::render_loop::RenderLoop;
use crate::render::surface::DisplaySurface;
use crate::render::tier::RenderTier;
use crate::shader::{RendererFactory, SharedShaderRenderer};
use crate::source::FrameSource;
use common::{PipelineError, PipelineEvent, RenderMode};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RenderPipelineOptions {
    pub render_scale: u32,
    /// Tier to probe first; `None` starts at the GPU
    pub preferred_mode: Option<RenderMode>,
    pub health: HealthSettings,
}

impl Default for RenderPipelineOptions {
    fn default() -> Self {
        Self {
            render_scale: 4,
            preferred_mode: None,
            health: HealthSettings::default(),
        }
    }
}

impl RenderPipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            render_scale: config.general.render_scale,
            preferred_mode: config.preferred_mode(),
            health: config.health.clone(),
        }
    }
}

/// A constructed tier plus the handles other components borrow from it
struct TierHandle {
    tier: Arc<dyn RenderTier>,
    renderer: Option<SharedShaderRenderer>,
    canvas: Option<Arc<Mutex<Canvas>>>,
}

impl TierHandle {
    fn gpu(renderer: SharedShaderRenderer, display: Arc<dyn DisplaySurface>) -> Self {
        Self {
            tier: Arc::new(GpuTier::new(Arc::clone(&renderer), display)),
            renderer: Some(renderer),
            canvas: None,
        }
    }

    fn raster(raster: RasterFallbackRenderer) -> Self {
        let canvas = raster.canvas();
        Self {
            tier: Arc::new(raster),
            renderer: None,
            canvas: Some(canvas),
        }
    }

    fn raw(display: Arc<dyn DisplaySurface>) -> Self {
        Self {
            tier: Arc::new(RawPassthrough::new(display)),
            renderer: None,
            canvas: None,
        }
    }

    fn mode(&self) -> RenderMode {
        self.tier.mode()
    }
}

/// The running tier with its loop and health check
struct ActiveTier {
    handle: TierHandle,
    render_loop: Option<RenderLoop>,
    health: CancellationToken,
}

impl ActiveTier {
    fn teardown(mut self) {
        self.health.cancel();
        if let Some(mut render_loop) = self.render_loop.take() {
            render_loop.stop();
        }
        self.handle.tier.shutdown();
    }
}

struct Inner {
    source: Arc<dyn FrameSource>,
    display: Arc<dyn DisplaySurface>,
    factory: Arc<dyn RendererFactory>,
    events: EventBus,
    options: RenderPipelineOptions,
    mode: Mutex<Option<RenderMode>>,
    active: tokio::sync::Mutex<Option<ActiveTier>>,
    streaming: Arc<AtomicBool>,
}

/// Chooses how source frames reach the display.
///
/// Selection starts at the GPU shader tier and moves down to the 2D raster
/// tier and then raw passthrough when a tier cannot be built. While running,
/// a stall reported by the health check downgrades exactly one tier. There is
/// no automatic upgrade; [`start_stream`](Self::start_stream) probes from the
/// top again.
#[derive(Clone)]
pub struct RenderPipeline {
    inner: Arc<Inner>,
}

impl RenderPipeline {
    pub fn new(
        source: Arc<dyn FrameSource>,
        display: Arc<dyn DisplaySurface>,
        factory: Arc<dyn RendererFactory>,
        events: EventBus,
        options: RenderPipelineOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                display,
                factory,
                events,
                options,
                mode: Mutex::new(None),
                active: tokio::sync::Mutex::new(None),
                streaming: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Select a tier and start rendering the source
    pub async fn start_stream(&self) -> RenderMode {
        let mut active = self.inner.active.lock().await;
        if let Some(previous) = active.take() {
            log::debug!("Restarting stream, dropping {} tier", previous.handle.mode());
            previous.teardown();
        }

        self.inner.streaming.store(true, Ordering::Release);

        let first = self.inner.options.preferred_mode.unwrap_or(RenderMode::Gpu);
        let handle = self.select_from(first).await;
        let mode = handle.mode();

        *active = Some(self.activate(handle));
        self.set_mode(mode);
        mode
    }

    /// Stop rendering and release the active tier; idempotent
    pub async fn stop(&self) {
        let mut active = self.inner.active.lock().await;
        self.inner.streaming.store(false, Ordering::Release);

        if let Some(previous) = active.take() {
            log::info!("Stopping {} rendering", previous.handle.mode());
            previous.teardown();
        }
        *self.inner.mode.lock() = None;
    }

    /// Currently active tier, `None` before the stream starts
    pub fn active_mode(&self) -> Option<RenderMode> {
        *self.inner.mode.lock()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.streaming.load(Ordering::Acquire)
    }

    /// Move to `mode` directly.
    ///
    /// Does nothing if `mode` is already active. On error the current tier
    /// keeps running.
    pub async fn switch_mode(&self, mode: RenderMode) -> Result<RenderMode, PipelineError> {
        let mut active = self.inner.active.lock().await;
        let current = active
            .as_ref()
            .map(|a| a.handle.mode())
            .ok_or_else(|| PipelineError::NotActive("Render pipeline".into()))?;

        if current == mode {
            log::debug!("Already rendering in {} mode", mode);
            return Ok(mode);
        }

        let handle = self.build_tier(mode).await?;
        self.replace_tier(&mut active, handle, current);
        log::info!("Switched rendering from {} to {}", current, mode);
        Ok(mode)
    }

    /// Downgrade the active tier by one step.
    ///
    /// Returns the new mode, or `None` if nothing is running or the raw tier
    /// is already active.
    pub async fn handle_stall(&self) -> Option<RenderMode> {
        let mut active = self.inner.active.lock().await;
        let current = active.as_ref().map(|a| a.handle.mode())?;
        self.downgrade_locked(&mut active, current).await
    }

    /// Capture what the active tier shows
    pub async fn capture(&self) -> Result<Frame, PipelineError> {
        let tier = self
            .inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| Arc::clone(&a.handle.tier));

        match tier {
            Some(tier) => tier.capture().await,
            None => Err(PipelineError::NotActive("Render pipeline".into())),
        }
    }

    /// The shader renderer while the GPU tier is active
    pub async fn shader_renderer(&self) -> Option<SharedShaderRenderer> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .and_then(|a| a.handle.renderer.clone())
    }

    /// The drawing surface while the raster tier is active
    pub async fn raster_canvas(&self) -> Option<Arc<Mutex<Canvas>>> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .and_then(|a| a.handle.canvas.clone())
    }

    pub fn source(&self) -> Arc<dyn FrameSource> {
        Arc::clone(&self.inner.source)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    async fn build_tier(&self, mode: RenderMode) -> Result<TierHandle, PipelineError> {
        match mode {
            RenderMode::Gpu => {
                let renderer = self.inner.factory.create().await?;
                if !renderer.is_active() {
                    renderer.shutdown();
                    return Err(PipelineError::NotActive("Shader pipeline".into()));
                }
                Ok(TierHandle::gpu(renderer, Arc::clone(&self.inner.display)))
            }
            RenderMode::Raster2d => {
                RasterFallbackRenderer::new(self.inner.options.render_scale).map(TierHandle::raster)
            }
            RenderMode::Raw => Ok(TierHandle::raw(Arc::clone(&self.inner.display))),
        }
    }

    /// Build the first available tier at or below `mode`
    async fn select_from(&self, mode: RenderMode) -> TierHandle {
        let mut candidate = Some(mode);
        while let Some(mode) = candidate {
            match self.build_tier(mode).await {
                Ok(handle) => return handle,
                Err(e) => {
                    log::warn!("{} rendering unavailable: {}", mode, e);
                    candidate = mode.downgrade();
                }
            }
        }
        TierHandle::raw(Arc::clone(&self.inner.display))
    }

    async fn downgrade_locked(
        &self,
        active: &mut Option<ActiveTier>,
        from: RenderMode,
    ) -> Option<RenderMode> {
        let Some(next) = from.downgrade() else {
            log::warn!("{} rendering stalled with no tier left to fall back to", from);
            return None;
        };

        let handle = self.select_from(next).await;
        let mode = handle.mode();
        self.replace_tier(active, handle, from);

        crate::emit_status!(
            self.inner.events,
            Warning,
            "{} rendering stalled, switched to {}",
            from,
            mode
        );
        Some(mode)
    }

    fn replace_tier(&self, active: &mut Option<ActiveTier>, handle: TierHandle, previous: RenderMode) {
        if let Some(old) = active.take() {
            old.teardown();
        }

        // A surface used by the GPU cannot be drawn on in 2D
        if previous == RenderMode::Gpu {
            if let Some(canvas) = &handle.canvas {
                let new_surface = canvas.lock().id();
                self.inner.events.emit(PipelineEvent::CanvasRecreated {
                    old_surface: self.inner.display.id(),
                    new_surface,
                });
            }
        }

        let mode = handle.mode();
        *active = Some(self.activate(handle));
        self.set_mode(mode);
    }

    fn activate(&self, handle: TierHandle) -> ActiveTier {
        let render_loop = match self.inner.source.stream().video_frames() {
            Some(frames) => {
                let streaming = Arc::clone(&self.inner.streaming);
                Some(RenderLoop::start(frames, Arc::clone(&handle.tier), move || {
                    streaming.load(Ordering::Acquire)
                }))
            }
            None => {
                log::warn!("Source has no live video track");
                None
            }
        };

        let health = CancellationToken::new();
        if handle.mode().downgrade().is_some() {
            self.spawn_health(Arc::clone(&handle.tier), health.clone());
        }

        ActiveTier {
            handle,
            render_loop,
            health,
        }
    }

    fn spawn_health(&self, tier: Arc<dyn RenderTier>, cancel: CancellationToken) {
        let monitor = HealthMonitor::from_settings(&self.inner.options.health);
        let source = Arc::clone(&self.inner.source);
        let pipeline = self.clone();
        let mode = tier.mode();

        let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            let sample = move || HealthSample {
                progress: tier.progress(),
                source_timestamp: source.latest_frame().map(|f| f.timestamp),
            };

            if monitor.run(cancel, sample).await == HealthOutcome::Unhealthy {
                pipeline.on_unhealthy(mode).await;
            }
        });
        tokio::spawn(task);
    }

    async fn on_unhealthy(&self, from: RenderMode) {
        let mut active = self.inner.active.lock().await;
        if active.as_ref().map(|a| a.handle.mode()) != Some(from) {
            log::debug!("Ignoring stale stall report for {} tier", from);
            return;
        }
        self.downgrade_locked(&mut active, from).await;
    }

    fn set_mode(&self, mode: RenderMode) {
        *self.inner.mode.lock() = Some(mode);
        log::info!("Rendering in {} mode", mode);
        self.inner.events.emit(PipelineEvent::ModeChanged { mode });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::drain;
    use crate::render::surface::FrameBufferSurface;
    use crate::shader::NoRenderer;
    use crate::source::TestPatternSource;

    fn pipeline_without_gpu() -> (RenderPipeline, Arc<TestPatternSource>, EventBus) {
        let source = Arc::new(TestPatternSource::new(60));
        let events = EventBus::default();
        let pipeline = RenderPipeline::new(
            source.clone(),
            Arc::new(FrameBufferSurface::new()),
            Arc::new(NoRenderer),
            events.clone(),
            RenderPipelineOptions {
                render_scale: 2,
                ..Default::default()
            },
        );
        (pipeline, source, events)
    }

    #[tokio::test]
    async fn test_falls_back_to_raster_without_gpu() {
        let (pipeline, _source, events) = pipeline_without_gpu();
        let mut rx = events.subscribe();

        assert_eq!(pipeline.active_mode(), None);
        assert_eq!(pipeline.start_stream().await, RenderMode::Raster2d);
        assert_eq!(pipeline.active_mode(), Some(RenderMode::Raster2d));
        assert!(pipeline.shader_renderer().await.is_none());
        assert!(pipeline.raster_canvas().await.is_some());

        assert_eq!(
            drain(&mut rx),
            vec![PipelineEvent::ModeChanged {
                mode: RenderMode::Raster2d
            }]
        );
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_switch_mode_is_idempotent() {
        let (pipeline, _source, events) = pipeline_without_gpu();
        pipeline.start_stream().await;
        let mut rx = events.subscribe();

        assert_eq!(
            pipeline.switch_mode(RenderMode::Raster2d).await.unwrap(),
            RenderMode::Raster2d
        );
        assert!(drain(&mut rx).is_empty());

        assert_eq!(pipeline.switch_mode(RenderMode::Raw).await.unwrap(), RenderMode::Raw);
        assert_eq!(pipeline.active_mode(), Some(RenderMode::Raw));
        assert_eq!(
            drain(&mut rx),
            vec![PipelineEvent::ModeChanged {
                mode: RenderMode::Raw
            }]
        );
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_switch_to_unavailable_gpu_keeps_current_tier() {
        let (pipeline, _source, _events) = pipeline_without_gpu();
        pipeline.start_stream().await;

        assert!(matches!(
            pipeline.switch_mode(RenderMode::Gpu).await,
            Err(PipelineError::DeviceLost(_))
        ));
        assert_eq!(pipeline.active_mode(), Some(RenderMode::Raster2d));
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_stall_walks_down_to_raw_and_stops() {
        let (pipeline, _source, events) = pipeline_without_gpu();
        pipeline.start_stream().await;
        let mut rx = events.subscribe();

        assert_eq!(pipeline.handle_stall().await, Some(RenderMode::Raw));
        assert_eq!(pipeline.handle_stall().await, None);
        assert_eq!(pipeline.active_mode(), Some(RenderMode::Raw));

        let modes: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::ModeChanged { mode } => Some(mode),
                _ => None,
            })
            .collect();
        assert_eq!(modes, vec![RenderMode::Raw]);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (pipeline, _source, _events) = pipeline_without_gpu();
        pipeline.stop().await;

        pipeline.start_stream().await;
        pipeline.stop().await;
        pipeline.stop().await;

        assert_eq!(pipeline.active_mode(), None);
        assert!(!pipeline.is_streaming());
        assert!(matches!(
            pipeline.capture().await,
            Err(PipelineError::NotActive(_))
        ));
        assert!(matches!(
            pipeline.switch_mode(RenderMode::Raw).await,
            Err(PipelineError::NotActive(_))
        ));
    }

    #[tokio::test]
    async fn test_raster_tier_renders_published_frames() {
        let (pipeline, source, _events) = pipeline_without_gpu();
        pipeline.start_stream().await;

        source.publish_pattern(1).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let captured = pipeline.capture().await.unwrap();
        assert_eq!(captured.width(), 320);
        assert_eq!(captured.height(), 288);
        pipeline.stop().await;
    }
}
