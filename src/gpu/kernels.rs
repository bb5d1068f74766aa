//! Compute pipelines for every blur kernel
//!
//! Bindings shared by all kernels:
//! 0. source (sampled texture)
//! 1. target (write-only storage texture)
//! 2. `KernelParams` uniform
//! 3. linear sampler
//!
//! The blend kernel additionally binds 4, a sampled copy of the target taken
//! just before the dispatch, since a storage texture cannot also be sampled.

use std::collections::HashMap;

use super::context::GpuContext;
use crate::backend::{Kernel, KernelInfo, TextureFormat};

/// Every kernel is compiled with this workgroup size
pub const WORKGROUP_SIZE: (u32, u32) = (8, 8);

pub(crate) struct KernelPipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
}

pub struct ComputeKernels {
    pipelines: HashMap<Kernel, KernelPipeline>,
    sampler: wgpu::Sampler,
    format: TextureFormat,
}

pub(crate) fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

fn storage_format_name(format: TextureFormat) -> &'static str {
    match format {
        TextureFormat::Rgba8Unorm => "rgba8unorm",
        TextureFormat::Rgba16Float => "rgba16float",
    }
}

fn sampled_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn layout_entries(format: TextureFormat, with_base: bool) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![
        // source_texture (sampled)
        sampled_entry(0),
        // target_texture (storage)
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: wgpu_format(format),
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        },
        // params
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        // sampler
        wgpu::BindGroupLayoutEntry {
            binding: 3,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ];
    if with_base {
        entries.push(sampled_entry(4));
    }
    entries
}

impl ComputeKernels {
    pub fn new(ctx: &GpuContext, format: TextureFormat) -> Self {
        let device = &ctx.device;
        let storage_format = storage_format_name(format);

        let kawase_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Kawase Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("shaders/kawase.wgsl")
                    .replace("STORAGE_FORMAT", storage_format)
                    .into(),
            ),
        });
        let pixelate_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Pixelate Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("shaders/pixelate.wgsl")
                    .replace("STORAGE_FORMAT", storage_format)
                    .into(),
            ),
        });

        // Linear filtering, clamped at the edges
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blur Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mut pipelines = HashMap::new();
        for kernel in Kernel::ALL {
            let with_base = kernel == Kernel::LinearBlend;
            let module = match kernel {
                Kernel::Pixelate => &pixelate_shader,
                _ => &kawase_shader,
            };

            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(kernel.entry_point()),
                entries: &layout_entries(format, with_base),
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(kernel.entry_point()),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kernel.entry_point()),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(kernel.entry_point()),
                compilation_options: Default::default(),
                cache: None,
            });

            pipelines.insert(kernel, KernelPipeline { pipeline, layout });
        }

        Self {
            pipelines,
            sampler,
            format,
        }
    }

    pub fn info(&self, kernel: Kernel) -> Option<KernelInfo> {
        self.pipelines.contains_key(&kernel).then_some(KernelInfo {
            kernel,
            group_size: WORKGROUP_SIZE,
        })
    }

    pub(crate) fn pipeline(&self, kernel: Kernel) -> Option<&KernelPipeline> {
        self.pipelines.get(&kernel)
    }

    pub(crate) fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Storage format the kernels write
    pub fn format(&self) -> TextureFormat {
        self.format
    }
}
