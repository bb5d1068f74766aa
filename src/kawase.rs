//! Multi-pass Kawase blur between two persistent buffers
//!
//! Pass `p` samples at `0.5 + p` texels, so the sequence runs 1.5, 2.5, ...
//! The buffers are sized at `frame / downsample` and survive across frames;
//! they are only reallocated when that size changes.

use crate::backend::{
    CameraKind, CommandScope, Dispatch, FrameInfo, GpuBackend, Kernel, KernelInfo, KernelParams,
    KernelTable, TextureDesc, TextureHandle,
};
use crate::config::KawaseConfig;
use crate::error::BlurError;
use crate::pass::{PassOutput, PostProcessPass};
use crate::plan::Size;

const PING_TEXTURE_NAME: &str = "_TemporaryTexture1";
const PONG_TEXTURE_NAME: &str = "_TemporaryTexture2";

#[derive(Copy, Clone, Debug)]
struct PingPong {
    textures: [TextureHandle; 2],
    desc: TextureDesc,
}

pub struct KawasePass {
    label: String,
    kernel: KernelInfo,
    buffers: Option<PingPong>,
}

impl KawasePass {
    pub fn new(label: &str, kernels: &KernelTable) -> Result<Self, BlurError> {
        Ok(Self {
            label: label.to_string(),
            kernel: kernels.require(Kernel::KawaseBlur)?,
            buffers: None,
        })
    }

    /// Current ping-pong buffers, if allocated
    pub fn buffers(&self) -> Option<[TextureHandle; 2]> {
        self.buffers.map(|buffers| buffers.textures)
    }

    /// Offset sampled by pass `pass` (1-based)
    pub fn pass_offset(pass: u32) -> f32 {
        0.5 + pass as f32
    }

    fn reallocate_if_needed<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        desc: TextureDesc,
    ) -> Result<(), BlurError> {
        if self.buffers.is_some_and(|buffers| buffers.desc == desc) {
            return Ok(());
        }

        self.release_buffers(backend)?;
        log::debug!(
            "{}: allocating ping-pong buffers at {}x{}",
            self.label,
            desc.size.width,
            desc.size.height
        );
        let ping = backend.create_texture(PING_TEXTURE_NAME, desc)?;
        let pong = backend.create_texture(PONG_TEXTURE_NAME, desc)?;
        self.buffers = Some(PingPong {
            textures: [ping, pong],
            desc,
        });
        Ok(())
    }

    fn release_buffers<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), BlurError> {
        if let Some(buffers) = self.buffers.take() {
            for texture in buffers.textures {
                backend.destroy_texture(texture)?;
            }
        }
        Ok(())
    }

    fn blur<B: GpuBackend + ?Sized>(
        &self,
        scope: &mut CommandScope<'_, B>,
        source: (TextureHandle, Size),
        target: (TextureHandle, Size),
        offset: f32,
    ) -> Result<(), BlurError> {
        scope.dispatch(&Dispatch {
            kernel: Kernel::KawaseBlur,
            source: source.0,
            target: target.0,
            params: KernelParams::kawase(source.1, target.1, offset),
            groups: self.kernel.groups_for(target.1),
        })
    }
}

impl<B: GpuBackend + ?Sized> PostProcessPass<B> for KawasePass {
    type Config = KawaseConfig;

    fn label(&self) -> &str {
        &self.label
    }

    fn on_setup(&mut self, backend: &mut B, frame: &FrameInfo, config: &KawaseConfig) -> Result<(), BlurError> {
        let size = frame.size().scaled_down(config.downsample);
        self.reallocate_if_needed(backend, frame.descriptor.with_size(size))
    }

    fn execute(&mut self, backend: &mut B, frame: &FrameInfo, config: &KawaseConfig) -> Result<PassOutput, BlurError> {
        if frame.camera == CameraKind::Preview {
            return Ok(PassOutput::Skipped);
        }
        let Some(buffers) = self.buffers else {
            log::warn!("{}: executed before setup, skipping", self.label);
            return Ok(PassOutput::Skipped);
        };

        let mut scope = CommandScope::begin(backend, &self.label);
        let passes = config.pass_count.max(2) - 1;
        let buffer_size = buffers.desc.size;

        // `front` is always the buffer not being read
        let (mut front, mut back) = (0usize, 1usize);
        let mut source = (frame.color_target, frame.size());

        for pass in 1..passes {
            let target = (buffers.textures[front], buffer_size);
            self.blur(&mut scope, source, target, Self::pass_offset(pass))?;
            source = target;
            std::mem::swap(&mut front, &mut back);
        }

        let offset = Self::pass_offset(passes);
        if config.full_screen {
            self.blur(&mut scope, source, (frame.color_target, frame.size()), offset)?;
            Ok(PassOutput::Composited)
        } else {
            let target = buffers.textures[front];
            self.blur(&mut scope, source, (target, buffer_size), offset)?;
            scope.expose_named(&config.target_name, target)?;
            Ok(PassOutput::Exposed {
                name: config.target_name.clone(),
                texture: target,
            })
        }
    }

    fn dispose(&mut self, backend: &mut B) -> Result<(), BlurError> {
        self.release_buffers(backend)
    }
}
