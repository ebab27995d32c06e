//! Test doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use common::{Dimensions, PipelineError, PipelineEvent, ShaderPreset};
use engine::frame::{Frame, FrameTracker, VideoFrame};
use engine::media::MediaSink;
use engine::shader::{RendererFactory, ShaderRenderer, SharedShaderRenderer};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Semaphore;

/// Shader renderer producing solid frames, with scriptable failures and stalls
pub struct MockRenderer {
    pub target: Dimensions,
    pub frame_dims: Mutex<Dimensions>,
    pub color: [u8; 4],
    pub tracker: FrameTracker,
    pub active: AtomicBool,
    /// Captures never complete while set
    pub stalled: AtomicBool,
    /// Captures wait for a permit when set
    pub gate: Option<Arc<Semaphore>>,
    /// Upcoming outcomes, `true` fails the capture; empty means success
    pub script: Mutex<VecDeque<bool>>,
    pub captures: AtomicU64,
    pub submitted: AtomicU64,
}

impl MockRenderer {
    pub fn new(target: Dimensions) -> Self {
        Self {
            target,
            frame_dims: Mutex::new(target),
            color: [40, 180, 90, 255],
            tracker: FrameTracker::new(),
            active: AtomicBool::new(true),
            stalled: AtomicBool::new(false),
            gate: None,
            script: Mutex::new(VecDeque::new()),
            captures: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
        }
    }

    pub fn gated(target: Dimensions, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(target)
        }
    }

    pub fn with_frame_dims(self, dims: Dimensions) -> Self {
        *self.frame_dims.lock() = dims;
        self
    }

    pub fn script_failures(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.script.lock().extend(outcomes);
    }

    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ShaderRenderer for MockRenderer {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn submit_source(&self, _frame: &VideoFrame) -> Result<(), PipelineError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Frame, PipelineError> {
        if !self.is_active() {
            return Err(PipelineError::NotActive("Shader pipeline".into()));
        }
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| PipelineError::FrameCapture("gate closed".into()))?
                .forget();
        }

        let fail = self.script.lock().pop_front().unwrap_or(false);
        if fail {
            return Err(PipelineError::FrameCapture("scripted failure".into()));
        }

        let dims = *self.frame_dims.lock();
        let pixels = self
            .color
            .iter()
            .copied()
            .cycle()
            .take(dims.rgba_len())
            .collect();
        let frame = Frame::tracked(dims.width, dims.height, pixels, &self.tracker)?;
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn target_dimensions(&self) -> Dimensions {
        self.target
    }

    fn progress(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }

    fn set_preset(&self, _preset: &ShaderPreset) {}

    fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Hands out the same mock renderer on every stream start
pub struct MockFactory {
    pub renderer: Arc<MockRenderer>,
}

#[async_trait]
impl RendererFactory for MockFactory {
    async fn create(&self) -> Result<SharedShaderRenderer, PipelineError> {
        self.renderer.active.store(true, Ordering::SeqCst);
        Ok(self.renderer.clone())
    }
}

/// Keeps saved files in memory
#[derive(Default)]
pub struct MemorySink {
    pub saved: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl MediaSink for MemorySink {
    async fn encode_and_save(&self, bytes: Vec<u8>, filename: &str) -> Result<PathBuf, PipelineError> {
        self.saved.lock().push((filename.to_string(), bytes));
        Ok(PathBuf::from(filename))
    }
}

pub fn mode_changes(events: &[PipelineEvent]) -> Vec<common::RenderMode> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::ModeChanged { mode } => Some(*mode),
            _ => None,
        })
        .collect()
}

pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
