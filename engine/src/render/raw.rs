use crate::frame::{Frame, VideoFrame};
use crate::render::surface::DisplaySurface;
use crate::render::tier::RenderTier;
use async_trait::async_trait;
use common::{Dimensions, PipelineError, RenderMode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Presents source frames untouched
pub struct RawPassthrough {
    display: Arc<dyn DisplaySurface>,
    latest: Mutex<Option<VideoFrame>>,
    progress: AtomicU64,
}

impl RawPassthrough {
    pub fn new(display: Arc<dyn DisplaySurface>) -> Self {
        Self {
            display,
            latest: Mutex::new(None),
            progress: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RenderTier for RawPassthrough {
    fn mode(&self) -> RenderMode {
        RenderMode::Raw
    }

    async fn render(&self, frame: &VideoFrame) -> Result<(), PipelineError> {
        self.display.present(&frame.data, frame.dimensions())?;
        *self.latest.lock() = Some(frame.clone());
        self.progress.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn capture(&self) -> Result<Frame, PipelineError> {
        let latest = self.latest.lock().clone();
        match latest {
            Some(frame) => Frame::from_video(&frame),
            None => Err(PipelineError::FrameCapture("No source frame yet".into())),
        }
    }

    fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    fn target_dimensions(&self) -> Dimensions {
        self.latest
            .lock()
            .as_ref()
            .map(VideoFrame::dimensions)
            .unwrap_or_else(Dimensions::native)
    }

    fn shutdown(&self) {
        self.latest.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::surface::FrameBufferSurface;
    use std::time::Duration;

    #[tokio::test]
    async fn test_passthrough_presents_and_captures() {
        let display = Arc::new(FrameBufferSurface::new());
        let tier = RawPassthrough::new(display.clone());

        assert!(matches!(
            tier.capture().await,
            Err(PipelineError::FrameCapture(_))
        ));
        assert_eq!(tier.target_dimensions(), Dimensions::native());

        let frame = VideoFrame::new(Duration::ZERO, 2, 1, vec![5u8; 8]).unwrap();
        tier.render(&frame).await.unwrap();

        assert_eq!(display.presented(), 1);
        assert_eq!(tier.progress(), 1);
        assert_eq!(tier.target_dimensions(), Dimensions::new(2, 1));

        let captured = tier.capture().await.unwrap();
        assert_eq!(captured.pixel(1, 0), Some([5, 5, 5, 5]));
    }
}
