use crate::frame::{Frame, FrameTracker, VideoFrame};
use crate::gpu::pass::{self, PassBuilder};
use crate::gpu::{GpuContext, GpuTexture};
use crate::shader::{RendererFactory, ShaderRenderer, ShaderUniforms, SharedShaderRenderer};

use anyhow::Result;
use async_trait::async_trait;
use common::{Dimensions, DisplayEffect, PipelineError, ShaderParams, ShaderPreset};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use wgpu::util::DeviceExt;

/// Three-pass shader pipeline: color, integer upscale, screen simulation.
///
/// Every capture allocates its own render targets and readback buffer, so
/// the display and recording loops can capture concurrently.
pub struct GpuShaderRenderer {
    context: GpuContext,
    color_pipeline: wgpu::RenderPipeline,
    upscale_pipeline: wgpu::RenderPipeline,
    effect_pipeline: wgpu::RenderPipeline,
    /// Texture + sampler + uniforms, shared by all passes
    pass_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    source: Mutex<Option<GpuTexture>>,
    params: Mutex<ShaderParams>,
    render_scale: u32,
    active: AtomicBool,
    progress: AtomicU64,
    tracker: FrameTracker,
}

impl GpuShaderRenderer {
    pub async fn new(render_scale: u32, preset: &ShaderPreset) -> Result<Self> {
        let context = GpuContext::new().await?;
        let device = &context.device;

        let pass_layout = pass::pass_layout(device);

        // Nearest filtering keeps the device's pixels sharp
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Nearest Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let builder = PassBuilder::new(device, &pass_layout);
        let color_pipeline = builder.build("Color Pass", include_str!("shaders/color.wgsl"));
        let upscale_pipeline = builder.build("Upscale Pass", include_str!("shaders/upscale.wgsl"));
        let effect_pipeline = builder.build("Effect Pass", include_str!("shaders/effect.wgsl"));
        drop(builder);

        log::info!(
            "GPU shader renderer ready: {}x scale, preset '{}'",
            render_scale,
            preset.id
        );

        Ok(Self {
            context,
            color_pipeline,
            upscale_pipeline,
            effect_pipeline,
            pass_layout,
            sampler,
            source: Mutex::new(None),
            params: Mutex::new(preset.params),
            render_scale: render_scale.max(1),
            active: AtomicBool::new(true),
            progress: AtomicU64::new(0),
            tracker: FrameTracker::new(),
        })
    }

    fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::RenderPipeline,
        input: &GpuTexture,
        uniforms: &wgpu::Buffer,
        output: &GpuTexture,
    ) {
        let bind_group = pass::pass_bind_group(
            &self.context.device,
            &self.pass_layout,
            label,
            &input.view,
            &self.sampler,
            uniforms,
        );
        pass::encode_pass(encoder, label, pipeline, &bind_group, &output.view);
    }

    /// Encode and submit all passes, returning the texture holding the result
    fn render_passes(&self, params: &ShaderParams, target: Dimensions) -> Result<GpuTexture, PipelineError> {
        let source_guard = self.source.lock();
        let source = source_guard
            .as_ref()
            .ok_or_else(|| PipelineError::FrameCapture("No source frame submitted yet".into()))?;
        let source_dims = source.dimensions();

        let uniforms = ShaderUniforms::new(params, source_dims, target);
        let uniform_buffer =
            self.context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Shader Uniforms"),
                    contents: bytemuck::cast_slice(&[uniforms]),
                    usage: wgpu::BufferUsages::UNIFORM,
                });

        let graded = GpuTexture::render_target(&self.context.device, source_dims, "Color Pass Target");
        let upscaled = GpuTexture::render_target(&self.context.device, target, "Upscale Pass Target");

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Shader Capture Encoder"),
                });

        self.draw(
            &mut encoder,
            "Color Pass",
            &self.color_pipeline,
            source,
            &uniform_buffer,
            &graded,
        );
        self.draw(
            &mut encoder,
            "Upscale Pass",
            &self.upscale_pipeline,
            &graded,
            &uniform_buffer,
            &upscaled,
        );

        let output = if params.effect == DisplayEffect::None {
            upscaled
        } else {
            let simulated =
                GpuTexture::render_target(&self.context.device, target, "Effect Pass Target");
            self.draw(
                &mut encoder,
                "Effect Pass",
                &self.effect_pipeline,
                &upscaled,
                &uniform_buffer,
                &simulated,
            );
            simulated
        };

        self.context.queue.submit(std::iter::once(encoder.finish()));
        Ok(output)
    }
}

#[async_trait]
impl ShaderRenderer for GpuShaderRenderer {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.context.is_lost()
    }

    fn submit_source(&self, frame: &VideoFrame) -> Result<(), PipelineError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(PipelineError::NotActive("Shader pipeline".into()));
        }

        let dims = frame.dimensions();
        let mut source = self.source.lock();
        if source.as_ref().map(GpuTexture::dimensions) != Some(dims) {
            *source = Some(GpuTexture::source(&self.context.device, dims));
        }

        match source.as_ref() {
            Some(texture) => texture.write_rgba(&self.context.queue, &frame.data),
            None => Err(PipelineError::FrameCapture("Source texture missing".into())),
        }
    }

    async fn capture_frame(&self) -> Result<Frame, PipelineError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(PipelineError::NotActive("Shader pipeline".into()));
        }
        if self.context.is_lost() {
            return Err(PipelineError::DeviceLost(self.context.adapter_info.name.clone()));
        }

        let params = *self.params.lock();
        let target = self.target_dimensions();

        let output = self.render_passes(&params, target)?;
        let pixels = output
            .read_rgba(&self.context.device, &self.context.queue)
            .await?;

        if self.context.is_lost() {
            return Err(PipelineError::DeviceLost(self.context.adapter_info.name.clone()));
        }

        self.progress.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "profiling")]
        log::trace!("GPU capture {} complete ({})", self.progress(), target);

        Frame::tracked(target.width, target.height, pixels, &self.tracker)
    }

    fn target_dimensions(&self) -> Dimensions {
        Dimensions::native().scaled(self.render_scale)
    }

    fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    fn set_preset(&self, preset: &ShaderPreset) {
        log::info!("Applying shader preset '{}' ({})", preset.id, preset.name);
        crate::log_params!(
            preset.id,
            "brightness" => preset.params.brightness,
            "contrast" => preset.params.contrast,
            "saturation" => preset.params.saturation,
            "gamma" => preset.params.gamma,
            "effect" => preset.params.effect.name(),
            "effect_strength" => preset.params.effect_strength
        );
        *self.params.lock() = preset.params;
    }

    fn shutdown(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            log::info!(
                "Shutting down GPU shader renderer after {} captures",
                self.progress()
            );
            self.source.lock().take();
        }
    }
}

/// Creates a [`GpuShaderRenderer`] on stream start
#[derive(Debug, Clone)]
pub struct WgpuRendererFactory {
    pub render_scale: u32,
    pub preset: ShaderPreset,
}

#[async_trait]
impl RendererFactory for WgpuRendererFactory {
    async fn create(&self) -> Result<SharedShaderRenderer, PipelineError> {
        let renderer = GpuShaderRenderer::new(self.render_scale, &self.preset)
            .await
            .map_err(|e| PipelineError::DeviceLost(format!("{:#}", e)))?;
        Ok(Arc::new(renderer))
    }
}
