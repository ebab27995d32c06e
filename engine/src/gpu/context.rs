//! Headless wgpu device for the shader passes

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Device and queue used by one shader renderer.
///
/// No window surface is involved: every pass renders into offscreen
/// textures that are read back to the CPU.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    lost: Arc<AtomicBool>,
}

pub(crate) fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Prefer a discrete GPU; software adapters are not requested
pub(crate) fn adapter_options() -> wgpu::RequestAdapterOptions<'static, 'static> {
    wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        let adapter = create_instance()
            .request_adapter(&adapter_options())
            .await
            .context("No GPU adapter for the shader pipeline")?;

        let adapter_info = adapter.get_info();
        log::debug!(
            "Shader pipeline adapter: {} on {:?}",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Retrocast Shader Device"),
                ..Default::default()
            })
            .await
            .with_context(|| format!("Could not open a device on {}", adapter_info.name))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({:?}): {}", reason, message);
            flag.store(true, Ordering::Release);
        });

        Ok(Self {
            device,
            queue,
            adapter_info,
            lost,
        })
    }

    /// True once the driver reported the device as lost
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GpuContext({} {:?}{})",
            self.adapter_info.name,
            self.adapter_info.backend,
            if self.is_lost() { ", lost" } else { "" }
        )
    }
}
