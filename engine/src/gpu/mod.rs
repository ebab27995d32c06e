//! GPU shader tier built on wgpu
//!
//! - `context`: headless device and queue
//! - `pass`: full-screen pass layout, compilation and encoding
//! - `renderer`: the three-pass [`ShaderRenderer`](crate::shader::ShaderRenderer)
//! - `texture`: source upload, render targets and readback
pub mod context;
pub mod pass;
pub mod renderer;
pub mod texture;

pub use context::GpuContext;
pub use renderer::{GpuShaderRenderer, WgpuRendererFactory};
pub use texture::GpuTexture;

/// Format of every texture in the pipeline
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// What the best adapter offers, reported once at startup
#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub name: String,
    pub backend: wgpu::Backend,
    pub max_texture_size: u32,
}

impl std::fmt::Display for AdapterSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?}, textures up to {}px)",
            self.name, self.backend, self.max_texture_size
        )
    }
}

/// Look for an adapter without opening a device.
///
/// `None` means the shader tier will be skipped at stream start.
pub async fn probe() -> Option<AdapterSummary> {
    let adapter = context::create_instance()
        .request_adapter(&context::adapter_options())
        .await
        .inspect_err(|e| log::debug!("Adapter request failed: {}", e))
        .ok()?;

    let info = adapter.get_info();
    Some(AdapterSummary {
        name: info.name,
        backend: info.backend,
        max_texture_size: adapter.limits().max_texture_dimension_2d,
    })
}
