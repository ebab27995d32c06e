mod support;

use common::{Dimensions, PipelineEvent, RenderMode};
use engine::config::HealthSettings;
use engine::events::drain;
use engine::render::{DisplaySurface, FrameBufferSurface};
use engine::shader::NoRenderer;
use engine::source::TestPatternSource;
use engine::{EventBus, RenderPipeline, RenderPipelineOptions};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{MockFactory, MockRenderer, mode_changes, settle};

struct Harness {
    pipeline: RenderPipeline,
    renderer: Arc<MockRenderer>,
    source: Arc<TestPatternSource>,
    display: Arc<FrameBufferSurface>,
    events: EventBus,
}

fn harness(options: RenderPipelineOptions) -> Harness {
    let renderer = Arc::new(MockRenderer::new(Dimensions::native().scaled(4)));
    let source = Arc::new(TestPatternSource::new(60));
    let display = Arc::new(FrameBufferSurface::new());
    let events = EventBus::default();

    let pipeline = RenderPipeline::new(
        source.clone(),
        display.clone(),
        Arc::new(MockFactory {
            renderer: renderer.clone(),
        }),
        events.clone(),
        options,
    );

    Harness {
        pipeline,
        renderer,
        source,
        display,
        events,
    }
}

#[tokio::test]
async fn test_stalls_downgrade_one_tier_at_a_time() {
    let h = harness(RenderPipelineOptions::default());
    let mut rx = h.events.subscribe();

    assert_eq!(h.pipeline.start_stream().await, RenderMode::Gpu);
    assert!(h.pipeline.shader_renderer().await.is_some());

    assert_eq!(h.pipeline.handle_stall().await, Some(RenderMode::Raster2d));
    assert_eq!(h.pipeline.active_mode(), Some(RenderMode::Raster2d));
    assert!(h.pipeline.shader_renderer().await.is_none());
    assert!(!h.renderer.active.load(Ordering::SeqCst));

    assert_eq!(h.pipeline.handle_stall().await, Some(RenderMode::Raw));
    assert_eq!(h.pipeline.handle_stall().await, None);
    assert_eq!(h.pipeline.active_mode(), Some(RenderMode::Raw));

    let events = drain(&mut rx);
    assert_eq!(
        mode_changes(&events),
        vec![RenderMode::Gpu, RenderMode::Raster2d, RenderMode::Raw]
    );

    let canvas = events.iter().find_map(|e| match e {
        PipelineEvent::CanvasRecreated {
            old_surface,
            new_surface,
        } => Some((*old_surface, *new_surface)),
        _ => None,
    });
    let (old_surface, new_surface) = canvas.expect("canvas-recreated on GPU downgrade");
    assert_eq!(old_surface, h.display.id());
    assert_ne!(old_surface, new_surface);

    h.pipeline.stop().await;
}

#[tokio::test]
async fn test_start_stream_probes_from_the_top_again() {
    let h = harness(RenderPipelineOptions::default());
    h.pipeline.start_stream().await;
    h.pipeline.handle_stall().await;
    assert_eq!(h.pipeline.active_mode(), Some(RenderMode::Raster2d));

    assert_eq!(h.pipeline.start_stream().await, RenderMode::Gpu);
    assert!(h.renderer.active.load(Ordering::SeqCst));
    h.pipeline.stop().await;
}

#[tokio::test]
async fn test_preferred_mode_caps_selection() {
    let h = harness(RenderPipelineOptions {
        preferred_mode: Some(RenderMode::Raw),
        ..Default::default()
    });

    assert_eq!(h.pipeline.start_stream().await, RenderMode::Raw);
    assert!(h.pipeline.raster_canvas().await.is_none());
    h.pipeline.stop().await;
}

#[tokio::test]
async fn test_missing_gpu_falls_back_to_raster() {
    let source = Arc::new(TestPatternSource::new(60));
    let pipeline = RenderPipeline::new(
        source,
        Arc::new(FrameBufferSurface::new()),
        Arc::new(NoRenderer),
        EventBus::default(),
        RenderPipelineOptions::default(),
    );

    assert_eq!(pipeline.start_stream().await, RenderMode::Raster2d);
    pipeline.stop().await;
}

#[tokio::test]
async fn test_gpu_tier_presents_shader_output() {
    let h = harness(RenderPipelineOptions::default());
    h.pipeline.start_stream().await;

    for n in 0..3 {
        h.source.publish_pattern(n).unwrap();
        settle().await;
    }

    assert_eq!(h.renderer.submitted.load(Ordering::SeqCst), 3);
    assert_eq!(h.display.presented(), 3);
    assert_eq!(h.display.dimensions(), Some(Dimensions::new(640, 576)));
    assert_eq!(h.renderer.tracker.outstanding(), 0);

    h.pipeline.stop().await;
}

#[tokio::test]
async fn test_repeated_timestamp_is_rendered_once() {
    let h = harness(RenderPipelineOptions::default());
    h.pipeline.start_stream().await;

    h.source.publish_pattern(7).unwrap();
    settle().await;
    h.source.publish_pattern(7).unwrap();
    settle().await;

    assert_eq!(h.display.presented(), 1);
    h.pipeline.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_health_check_downgrades_stalled_gpu() {
    let h = harness(RenderPipelineOptions {
        health: HealthSettings {
            check_interval_ms: 1000,
            max_consecutive_stalls: 3,
        },
        ..Default::default()
    });
    let mut rx = h.events.subscribe();

    h.renderer.stall();
    h.source.start();
    assert_eq!(h.pipeline.start_stream().await, RenderMode::Gpu);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.pipeline.active_mode(), Some(RenderMode::Gpu));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.pipeline.active_mode(), Some(RenderMode::Raster2d));

    // The raster tier keeps up with the source, so it stays healthy
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.pipeline.active_mode(), Some(RenderMode::Raster2d));

    let events = drain(&mut rx);
    assert_eq!(
        mode_changes(&events),
        vec![RenderMode::Gpu, RenderMode::Raster2d]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::Status {
            level: common::StatusLevel::Warning,
            ..
        }
    )));

    h.pipeline.stop().await;
    h.source.stop();
}

#[tokio::test(start_paused = true)]
async fn test_idle_source_is_not_a_stall() {
    let h = harness(RenderPipelineOptions::default());
    h.pipeline.start_stream().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.pipeline.active_mode(), Some(RenderMode::Gpu));
    h.pipeline.stop().await;
}

#[tokio::test]
async fn test_capture_uses_active_tier() {
    let h = harness(RenderPipelineOptions::default());
    h.pipeline.start_stream().await;

    h.source.publish_pattern(0).unwrap();
    settle().await;

    let frame = h.pipeline.capture().await.unwrap();
    assert_eq!(frame.dimensions(), Dimensions::new(640, 576));
    assert_eq!(frame.pixel(0, 0), Some(h.renderer.color));
    frame.release();
    assert_eq!(h.renderer.tracker.outstanding(), 0);

    h.pipeline.switch_mode(RenderMode::Raw).await.unwrap();
    h.source.publish_pattern(1).unwrap();
    settle().await;

    let frame = h.pipeline.capture().await.unwrap();
    assert_eq!(frame.dimensions(), Dimensions::native());
    h.pipeline.stop().await;
}
