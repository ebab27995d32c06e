//! CPU 2D drawing surface
//!
//! Used as the raster tier's display target and as the recording pipeline's
//! off-screen surface. Scaling always uses nearest-neighbour sampling so the
//! device's pixels stay sharp.

use crate::frame::{Frame, VideoFrame};
use common::{Dimensions, PipelineError};
use fast_image_resize as fr;
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Opaque black, used for letterbox/pillarbox bars
pub const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique surface id
pub fn next_surface_id() -> u64 {
    NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed)
}

/// An RGBA8 drawing surface
pub struct Canvas {
    id: u64,
    image: RgbaImage,
    resizer: fr::Resizer,
}

impl Canvas {
    /// Create a transparent surface
    pub fn new(dims: Dimensions) -> Result<Self, PipelineError> {
        let dims = dims.validate()?;
        log::debug!("Allocating {} canvas", dims);

        Ok(Self {
            id: next_surface_id(),
            image: RgbaImage::new(dims.width, dims.height),
            resizer: fr::Resizer::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }

    /// Fill the whole surface with one color
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba(rgba);
        }
    }

    /// Reset to fully transparent
    pub fn clear(&mut self) {
        self.fill([0, 0, 0, 0]);
    }

    /// Reallocate the surface; contents are discarded
    pub fn resize(&mut self, dims: Dimensions) -> Result<(), PipelineError> {
        let dims = dims.validate()?;
        if dims != self.dimensions() {
            log::debug!("Resizing canvas {}: {} -> {}", self.id, self.dimensions(), dims);
            self.image = RgbaImage::new(dims.width, dims.height);
        }
        Ok(())
    }

    /// Draw RGBA pixels at (x, y), scaled to `dst` with nearest-neighbour sampling.
    ///
    /// Parts of the image falling outside the surface are clipped.
    pub fn draw_rgba(
        &mut self,
        pixels: &[u8],
        src: Dimensions,
        x: i64,
        y: i64,
        dst: Dimensions,
    ) -> Result<(), PipelineError> {
        let src = src.validate()?;
        let dst = dst.validate()?;

        if pixels.len() != src.rgba_len() {
            return Err(PipelineError::FrameCapture(format!(
                "Image data size mismatch: expected {}, got {}",
                src.rgba_len(),
                pixels.len()
            )));
        }

        let scaled = if src == dst {
            pixels.to_vec()
        } else {
            self.scale_nearest(pixels, src, dst)?
        };

        let top = RgbaImage::from_raw(dst.width, dst.height, scaled).ok_or_else(|| {
            PipelineError::FrameCapture("Failed to create scaled image buffer".into())
        })?;

        image::imageops::overlay(&mut self.image, &top, x, y);
        Ok(())
    }

    /// Draw a captured frame
    pub fn draw_frame(
        &mut self,
        frame: &Frame,
        x: i64,
        y: i64,
        dst: Dimensions,
    ) -> Result<(), PipelineError> {
        self.draw_rgba(frame.pixels(), frame.dimensions(), x, y, dst)
    }

    /// Draw a source frame
    pub fn draw_video(
        &mut self,
        frame: &VideoFrame,
        x: i64,
        y: i64,
        dst: Dimensions,
    ) -> Result<(), PipelineError> {
        self.draw_rgba(&frame.data, frame.dimensions(), x, y, dst)
    }

    fn scale_nearest(
        &mut self,
        pixels: &[u8],
        src: Dimensions,
        dst: Dimensions,
    ) -> Result<Vec<u8>, PipelineError> {
        let src_image =
            fr::images::Image::from_vec_u8(src.width, src.height, pixels.to_vec(), fr::PixelType::U8x4)
                .map_err(|e| PipelineError::FrameCapture(format!("Invalid source image: {}", e)))?;

        let mut dst_image = fr::images::Image::new(dst.width, dst.height, fr::PixelType::U8x4);

        self.resizer
            .resize(
                &src_image,
                &mut dst_image,
                &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest),
            )
            .map_err(|e| PipelineError::FrameCapture(format!("Failed to scale image: {}", e)))?;

        Ok(dst_image.into_vec())
    }

    /// RGBA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Copy the current contents into a new frame
    pub fn snapshot(&self) -> Result<Frame, PipelineError> {
        Frame::new(self.image.width(), self.image.height(), self.image.as_raw().clone())
    }

    /// Copy the current contents into a stream frame
    pub fn to_video_frame(&self, timestamp: Duration) -> Result<VideoFrame, PipelineError> {
        VideoFrame::new(
            timestamp,
            self.image.width(),
            self.image.height(),
            self.image.as_raw().clone(),
        )
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("id", &self.id)
            .field("dimensions", &self.dimensions())
            .finish()
    }
}
