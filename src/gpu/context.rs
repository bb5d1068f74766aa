//! GPU context management - headless device and queue setup

use crate::error::BlurError;

/// Holds the wgpu state the blur backend records into
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
}

impl GpuContext {
    /// Create a headless GPU context (no surface)
    pub fn new() -> Result<Self, BlurError> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self, BlurError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BlurError::Gpu("failed to find a suitable GPU adapter".to_string()))?;

        let info = adapter.get_info();
        log::info!("Using GPU: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Blur Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| BlurError::Gpu(format!("failed to create device: {}", e)))?;

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
        })
    }
}
