//! `GpuBackend` over wgpu
//!
//! Textures live in an arena indexed by `TextureHandle`. Commands recorded
//! inside a scope share one encoder, submitted when the outermost scope
//! closes; scopes map onto encoder debug groups. Anything recorded outside a
//! scope is submitted immediately.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::kernels::{ComputeKernels, wgpu_format};
use crate::backend::{
    Dispatch, GpuBackend, Kernel, KernelInfo, ScratchKey, TextureDesc, TextureFormat, TextureHandle,
};
use crate::error::BlurError;
use crate::image::RgbaImage;
use crate::plan::Size;
use crate::pool::ScratchPool;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

pub struct WgpuBackend {
    ctx: GpuContext,
    kernels: ComputeKernels,
    textures: Vec<Option<GpuTexture>>,
    pool: ScratchPool<TextureHandle>,
    named: HashMap<String, TextureHandle>,
    // Sampled copy of a dispatch target, reallocated on size change
    shadow: Option<TextureHandle>,
    encoder: Option<wgpu::CommandEncoder>,
    depth: usize,
}

fn lookup(textures: &[Option<GpuTexture>], handle: TextureHandle) -> Result<&GpuTexture, BlurError> {
    textures
        .get(handle.0 as usize)
        .and_then(Option::as_ref)
        .ok_or(BlurError::UnknownTexture(handle))
}

fn open_encoder<'a>(
    encoder: &'a mut Option<wgpu::CommandEncoder>,
    device: &wgpu::Device,
) -> &'a mut wgpu::CommandEncoder {
    encoder.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Blur Encoder"),
        })
    })
}

fn extent(size: Size) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

impl WgpuBackend {
    pub fn new(ctx: GpuContext, format: TextureFormat) -> Self {
        let kernels = ComputeKernels::new(&ctx, format);
        Self {
            ctx,
            kernels,
            textures: Vec::new(),
            pool: ScratchPool::new(),
            named: HashMap::new(),
            shadow: None,
            encoder: None,
            depth: 0,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Texture published under `name`, if any
    pub fn named(&self, name: &str) -> Option<TextureHandle> {
        self.named.get(name).copied()
    }

    pub fn outstanding_scratch(&self) -> usize {
        self.pool.outstanding()
    }

    fn allocate(&mut self, label: &str, desc: TextureDesc) -> Result<TextureHandle, BlurError> {
        if desc.format != self.kernels.format() {
            return Err(BlurError::Gpu(format!(
                "texture format {:?} does not match kernel format {:?}",
                desc.format,
                self.kernels.format()
            )));
        }
        if desc.size.is_empty() {
            return Err(BlurError::Gpu(format!("zero-sized texture {}", label)));
        }

        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(desc.size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        let entry = GpuTexture { texture, view, desc };

        // reuse a vacant arena slot when there is one
        let index = match self.textures.iter().position(Option::is_none) {
            Some(index) => {
                self.textures[index] = Some(entry);
                index
            }
            None => {
                self.textures.push(Some(entry));
                self.textures.len() - 1
            }
        };
        Ok(TextureHandle(index as u32))
    }

    fn free(&mut self, handle: TextureHandle) -> Result<(), BlurError> {
        self.textures
            .get_mut(handle.0 as usize)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(BlurError::UnknownTexture(handle))
    }

    /// Upload an image into a texture of the same size
    pub fn upload(&mut self, handle: TextureHandle, image: &RgbaImage) -> Result<(), BlurError> {
        let texture = lookup(&self.textures, handle)?;
        if texture.desc.size != image.size() || texture.desc.format != TextureFormat::Rgba8Unorm {
            return Err(BlurError::Gpu(format!(
                "cannot upload {}x{} RGBA8 into {:?}",
                image.width, image.height, texture.desc
            )));
        }
        self.ctx.queue.write_texture(
            texture.texture.as_image_copy(),
            &image.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.width * 4),
                rows_per_image: Some(image.height),
            },
            extent(image.size()),
        );
        Ok(())
    }

    /// Copy a texture back to the CPU. Blocks until the GPU is done.
    pub fn read_back(&mut self, handle: TextureHandle) -> Result<RgbaImage, BlurError> {
        self.submit_if_unscoped();
        let texture = lookup(&self.textures, handle)?;
        let size = texture.desc.size;
        if texture.desc.format != TextureFormat::Rgba8Unorm {
            return Err(BlurError::Gpu("read back supports RGBA8 only".to_string()));
        }

        let unpadded = size.width * 4;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded * size.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            texture.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            extent(size),
        );
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.ctx.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BlurError::Gpu(format!("readback channel closed: {}", e)))?
            .map_err(|e| BlurError::Gpu(format!("failed to map readback buffer: {}", e)))?;

        let mut pixels = Vec::with_capacity((unpadded * size.height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        Ok(RgbaImage::from_pixels(size.width, size.height, pixels)?)
    }

    /// Keep `existing` when it already matches `desc`, otherwise replace it
    fn ensure_cached(
        &mut self,
        existing: Option<TextureHandle>,
        label: &str,
        desc: TextureDesc,
    ) -> Result<TextureHandle, BlurError> {
        if let Some(handle) = existing {
            if lookup(&self.textures, handle)?.desc == desc {
                return Ok(handle);
            }
            self.free(handle)?;
        }
        self.allocate(label, desc)
    }

    fn submit_if_unscoped(&mut self) {
        if self.depth == 0 {
            if let Some(encoder) = self.encoder.take() {
                self.ctx.queue.submit(std::iter::once(encoder.finish()));
            }
        }
    }

    fn record_copy(&mut self, source: TextureHandle, target: TextureHandle) -> Result<(), BlurError> {
        let src = lookup(&self.textures, source)?;
        let dst = lookup(&self.textures, target)?;
        if src.desc.size != dst.desc.size {
            return Err(BlurError::Gpu(format!(
                "copy size mismatch: {:?} -> {:?}",
                src.desc.size, dst.desc.size
            )));
        }
        open_encoder(&mut self.encoder, &self.ctx.device).copy_texture_to_texture(
            src.texture.as_image_copy(),
            dst.texture.as_image_copy(),
            extent(src.desc.size),
        );
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn resolve_kernel(&self, kernel: Kernel) -> Option<KernelInfo> {
        self.kernels.info(kernel)
    }

    fn acquire_scratch(&mut self, key: ScratchKey, desc: TextureDesc) -> Result<TextureHandle, BlurError> {
        // The pool's create callback needs `&mut self` for allocation
        let mut pool = std::mem::take(&mut self.pool);
        let acquired = pool
            .acquire(key, desc, |desc| self.allocate("Blur Scratch", *desc))
            .copied();
        self.pool = pool;
        acquired
    }

    fn release_scratch(&mut self, key: ScratchKey) -> Result<(), BlurError> {
        self.pool.release(key)
    }

    fn trim_scratch(&mut self) -> Result<(), BlurError> {
        let freed = self.pool.trim();
        if !freed.is_empty() {
            log::debug!("trimming {} pooled scratch textures", freed.len());
        }
        for handle in freed {
            self.free(handle)?;
        }
        Ok(())
    }

    fn create_texture(&mut self, label: &str, desc: TextureDesc) -> Result<TextureHandle, BlurError> {
        self.allocate(label, desc)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), BlurError> {
        self.free(texture)
    }

    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), BlurError> {
        log::trace!(
            "dispatch {:?} #{} -> #{} ({}x{} groups)",
            dispatch.kernel,
            dispatch.source.0,
            dispatch.target.0,
            dispatch.groups.0,
            dispatch.groups.1
        );

        // A storage texture cannot be sampled in the same dispatch. The blend
        // reads its own target, and a pass may read and write the frame; both
        // go through a shadow copy taken just before the dispatch.
        let aliased = dispatch.source == dispatch.target;
        let blends = dispatch.kernel == Kernel::LinearBlend;
        let shadow = if aliased || blends {
            let desc = lookup(&self.textures, dispatch.target)?.desc;
            let shadow = self.ensure_cached(self.shadow, "Shadow Copy", desc)?;
            self.shadow = Some(shadow);
            self.record_copy(dispatch.target, shadow)?;
            Some(shadow)
        } else {
            None
        };
        let source = match shadow {
            Some(shadow) if aliased => shadow,
            _ => dispatch.source,
        };

        let pipeline = self
            .kernels
            .pipeline(dispatch.kernel)
            .ok_or(BlurError::MissingKernel(dispatch.kernel))?;
        let uniform_buffer = self.ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Kernel Params"),
            contents: bytemuck::cast_slice(&[dispatch.params]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&lookup(&self.textures, source)?.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&lookup(&self.textures, dispatch.target)?.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(self.kernels.sampler()),
            },
        ];
        if let (true, Some(shadow)) = (blends, shadow) {
            entries.push(wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::TextureView(&lookup(&self.textures, shadow)?.view),
            });
        }
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Kernel Bind Group"),
            layout: &pipeline.layout,
            entries: &entries,
        });

        {
            let encoder = open_encoder(&mut self.encoder, &self.ctx.device);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(dispatch.kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dispatch.groups.0, dispatch.groups.1, 1);
        }

        self.submit_if_unscoped();
        Ok(())
    }

    fn copy(&mut self, source: TextureHandle, target: TextureHandle) -> Result<(), BlurError> {
        self.record_copy(source, target)?;
        self.submit_if_unscoped();
        Ok(())
    }

    // The pass releases its scratch right after exposing, so the result is
    // copied into a texture the name owns.
    fn expose_named(&mut self, name: &str, texture: TextureHandle) -> Result<(), BlurError> {
        let desc = lookup(&self.textures, texture)?.desc;
        let existing = self.named.get(name).copied();
        let owned = self.ensure_cached(existing, name, desc)?;
        self.named.insert(name.to_string(), owned);
        self.record_copy(texture, owned)?;
        self.submit_if_unscoped();
        Ok(())
    }

    fn begin_scope(&mut self, label: &str) {
        self.depth += 1;
        open_encoder(&mut self.encoder, &self.ctx.device).push_debug_group(label);
    }

    fn end_scope(&mut self) {
        if self.depth == 0 {
            return;
        }
        open_encoder(&mut self.encoder, &self.ctx.device).pop_debug_group();
        self.depth -= 1;
        if self.depth == 0 {
            if self.pool.outstanding() > 0 {
                log::warn!(
                    "{} scratch textures still acquired at end of frame",
                    self.pool.outstanding()
                );
            }
            self.submit_if_unscoped();
        }
    }
}
