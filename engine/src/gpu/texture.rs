use common::{Dimensions, PipelineError};
use std::fmt::Display;
use std::time::Duration;

/// Longest a readback may wait on the device before the capture is dropped
const READBACK_TIMEOUT: Duration = Duration::from_secs(2);

/// A texture feeding or receiving one shader pass
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    fn create(
        device: &wgpu::Device,
        dims: Dimensions,
        label: &str,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(dims),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: crate::gpu::TEXTURE_FORMAT,
            usage,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width: dims.width,
            height: dims.height,
        }
    }

    /// Texture receiving uploaded source frames
    pub fn source(device: &wgpu::Device, dims: Dimensions) -> Self {
        log::debug!("Creating {} source texture", dims);
        Self::create(
            device,
            dims,
            "Source Frame Texture",
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        )
    }

    /// Render target that can be sampled by the next pass and read back
    pub fn render_target(device: &wgpu::Device, dims: Dimensions, label: &str) -> Self {
        Self::create(
            device,
            dims,
            label,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
        )
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Upload tightly packed RGBA8 pixels
    pub fn write_rgba(&self, queue: &wgpu::Queue, data: &[u8]) -> Result<(), PipelineError> {
        let dims = self.dimensions();
        if data.len() != dims.rgba_len() {
            return Err(PipelineError::FrameCapture(format!(
                "{} upload needs {} bytes, got {}",
                dims,
                dims.rgba_len(),
                data.len()
            )));
        }

        queue.write_texture(
            self.texture.as_image_copy(),
            data,
            RowLayout::tight(dims).copy_layout(),
            extent(dims),
        );
        Ok(())
    }

    /// Copy the texture into a mappable buffer and return tightly packed RGBA8
    pub async fn read_rgba(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<u8>, PipelineError> {
        let dims = self.dimensions();
        let rows = RowLayout::padded(dims);

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Readback"),
            size: rows.buffer_size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Capture Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: rows.copy_layout(),
            },
            extent(dims),
        );
        let submission = queue.submit([encoder.finish()]);

        let slice = readback.slice(..);
        let (mapped_tx, mapped_rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |mapped| {
            let _ = mapped_tx.send(mapped);
        });

        let waiter = device.clone();
        blocking_wait("readback", move || {
            waiter.poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: Some(READBACK_TIMEOUT),
            })
        })
        .await?;

        match mapped_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(PipelineError::FrameCapture(format!("Readback map failed: {}", e)));
            }
            Err(_) => return Err(PipelineError::FrameCapture("Readback was dropped".into())),
        }

        let pixels = rows.unpad(&slice.get_mapped_range());
        readback.unmap();
        Ok(pixels)
    }
}

/// Run a blocking device wait on the blocking pool.
///
/// The async runtime keeps scheduling other loops while the device works.
async fn blocking_wait<T, E, F>(what: &str, wait: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    tokio::task::spawn_blocking(wait)
        .await
        .map_err(|e| PipelineError::FrameCapture(format!("Waiting on {} failed: {}", what, e)))?
        .map_err(|e| PipelineError::FrameCapture(format!("Waiting on {}: {}", what, e)))
}

/// Row stride of a texture copy; buffer rows must be 256-byte aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RowLayout {
    row_bytes: u32,
    stride: u32,
    rows: u32,
}

impl RowLayout {
    fn tight(dims: Dimensions) -> Self {
        Self {
            row_bytes: dims.width * 4,
            stride: dims.width * 4,
            rows: dims.height,
        }
    }

    fn padded(dims: Dimensions) -> Self {
        let tight = Self::tight(dims);
        Self {
            stride: tight
                .row_bytes
                .next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
            ..tight
        }
    }

    fn buffer_size(&self) -> wgpu::BufferAddress {
        self.stride as wgpu::BufferAddress * self.rows as wgpu::BufferAddress
    }

    fn copy_layout(&self) -> wgpu::TexelCopyBufferLayout {
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(self.stride),
            rows_per_image: Some(self.rows),
        }
    }

    /// Drop the per-row padding
    fn unpad(&self, data: &[u8]) -> Vec<u8> {
        data.chunks(self.stride as usize)
            .take(self.rows as usize)
            .flat_map(|row| &row[..self.row_bytes as usize])
            .copied()
            .collect()
    }
}

pub(crate) fn extent(dims: Dimensions) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: dims.width,
        height: dims.height,
        depth_or_array_layers: 1,
    }
}
