mod support;

use common::{Dimensions, PipelineError, PipelineEvent};
use engine::canvas::OPAQUE_BLACK;
use engine::events::drain;
use engine::media::{MediaStream, MediaTrack};
use engine::recording::DROPPED_FRAME_THRESHOLD;
use engine::{EventBus, RecordingPipeline, RecordingRequest};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{MockRenderer, settle};
use tokio::sync::{Semaphore, watch};

const TARGET: Dimensions = Dimensions::new(640, 576);

fn source_stream() -> MediaStream {
    let (_tx, rx) = watch::channel(None);
    MediaStream::new(vec![
        MediaTrack::video("device-video", rx),
        MediaTrack::audio("device-audio"),
        MediaTrack::audio("link-cable"),
    ])
}

fn request(frame_rate: u32) -> RecordingRequest {
    RecordingRequest {
        source: Some(source_stream()),
        target_frame_rate: frame_rate,
    }
}

fn degraded_counts(events: &[PipelineEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::RecordingDegraded { dropped_frames } => Some(*dropped_frames),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_output_carries_cloned_audio_tracks() {
    let renderer = Arc::new(MockRenderer::new(TARGET));
    let pipeline = RecordingPipeline::new(renderer, EventBus::default());
    let source = source_stream();
    let source_audio: Vec<u64> = source.audio_tracks().map(|t| t.id()).collect();

    let output = pipeline
        .start(RecordingRequest {
            source: Some(source.clone()),
            target_frame_rate: 60,
        })
        .unwrap();

    let labels: Vec<&str> = output.audio_tracks().map(|t| t.label()).collect();
    assert_eq!(labels, vec!["device-audio", "link-cable"]);
    assert!(output.audio_tracks().all(|t| !source_audio.contains(&t.id())));

    pipeline.stop();
    assert!(!output.is_active());
    assert!(source.audio_tracks().all(|t| t.is_live()));
}

#[tokio::test(start_paused = true)]
async fn test_second_start_leaves_session_untouched() {
    let renderer = Arc::new(MockRenderer::new(TARGET));
    let pipeline = RecordingPipeline::new(renderer, EventBus::default());

    let output = pipeline.start(request(30)).unwrap();
    let surface = pipeline.surface().unwrap();
    let surface_id = surface.lock().id();

    assert!(matches!(
        pipeline.start(request(30)),
        Err(PipelineError::AlreadyActive(_))
    ));

    assert!(pipeline.is_active());
    assert!(output.is_active());
    assert_eq!(pipeline.surface().unwrap().lock().id(), surface_id);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pipeline.frames_drawn() > 0);
    pipeline.stop();
}

#[tokio::test(start_paused = true)]
async fn test_dropped_frames_report_every_thirty() {
    let renderer = Arc::new(MockRenderer::new(TARGET));
    renderer.script_failures(std::iter::repeat_n(true, 75));

    let events = EventBus::default();
    let mut rx = events.subscribe();
    let pipeline = RecordingPipeline::new(renderer.clone(), events);
    pipeline.start(request(30)).unwrap();

    // 75 ticks at 30 fps, plus a little slack
    tokio::time::sleep(Duration::from_millis(2480)).await;

    assert_eq!(degraded_counts(&drain(&mut rx)), vec![30, 30]);
    assert_eq!(pipeline.dropped_frames(), 15);
    assert!(pipeline.is_active());

    pipeline.stop();
    assert_eq!(renderer.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_success_does_not_reset_dropped_frames() {
    let renderer = Arc::new(MockRenderer::new(TARGET));
    let mut script = vec![true; 20];
    script.extend([false; 5]);
    script.extend([true; 10]);
    renderer.script_failures(script);

    let events = EventBus::default();
    let mut rx = events.subscribe();
    let pipeline = RecordingPipeline::new(renderer, events);
    pipeline.start(request(30)).unwrap();

    // 35 ticks
    tokio::time::sleep(Duration::from_millis(1150)).await;

    assert_eq!(
        degraded_counts(&drain(&mut rx)),
        vec![DROPPED_FRAME_THRESHOLD]
    );
    assert_eq!(pipeline.dropped_frames(), 0);
    pipeline.stop();
}

#[tokio::test(start_paused = true)]
async fn test_letterboxed_frames_are_centered() {
    let renderer =
        Arc::new(MockRenderer::new(TARGET).with_frame_dims(Dimensions::new(320, 200)));
    let pipeline = RecordingPipeline::new(renderer.clone(), EventBus::default());
    pipeline.start(request(30)).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let surface = pipeline.surface().unwrap();
    {
        let surface = surface.lock();
        assert_eq!(surface.pixel(0, 0), Some(OPAQUE_BLACK));
        assert_eq!(surface.pixel(0, 87), Some(OPAQUE_BLACK));
        assert_eq!(surface.pixel(0, 88), Some(renderer.color));
        assert_eq!(surface.pixel(639, 487), Some(renderer.color));
        assert_eq!(surface.pixel(639, 488), Some(OPAQUE_BLACK));
    }

    pipeline.stop();
    assert_eq!(renderer.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pending_capture_skips_ticks() {
    let gate = Arc::new(Semaphore::new(0));
    let renderer = Arc::new(MockRenderer::gated(TARGET, gate.clone()));
    let pipeline = RecordingPipeline::new(renderer.clone(), EventBus::default());
    pipeline.start(request(30)).unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(renderer.captures.load(Ordering::SeqCst), 0);

    gate.add_permits(1);
    settle().await;
    assert_eq!(renderer.captures.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.frames_drawn(), 1);

    pipeline.stop();
}

#[tokio::test(start_paused = true)]
async fn test_capture_finishing_after_stop_is_discarded() {
    let gate = Arc::new(Semaphore::new(0));
    let renderer = Arc::new(MockRenderer::gated(TARGET, gate.clone()));
    let pipeline = RecordingPipeline::new(renderer.clone(), EventBus::default());
    pipeline.start(request(30)).unwrap();

    settle().await;
    let surface = pipeline.surface().unwrap();
    pipeline.stop();

    gate.add_permits(1);
    settle().await;

    assert_eq!(renderer.captures.load(Ordering::SeqCst), 1);
    assert_eq!(surface.lock().pixel(320, 288), Some([0, 0, 0, 0]));
    assert_eq!(renderer.tracker.outstanding(), 0);
    assert_eq!(pipeline.frames_drawn(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop_resets_counters() {
    let renderer = Arc::new(MockRenderer::new(TARGET));
    renderer.script_failures(std::iter::repeat_n(true, 10));
    let pipeline = RecordingPipeline::new(renderer, EventBus::default());

    pipeline.start(request(30)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(pipeline.dropped_frames() > 0);
    pipeline.stop();

    pipeline.start(request(30)).unwrap();
    assert_eq!(pipeline.dropped_frames(), 0);
    assert_eq!(pipeline.frames_drawn(), 0);
    pipeline.dispose();
}
