//! Block pixelation: one compute thread per block, frame → persistent copy → frame

use crate::backend::{
    CommandScope, Dispatch, FrameInfo, GpuBackend, Kernel, KernelInfo, KernelParams, KernelTable,
    TextureDesc, TextureHandle,
};
use crate::config::PixelateConfig;
use crate::error::BlurError;
use crate::pass::{PassOutput, PostProcessPass};
use crate::plan::Size;

const COPY_TEXTURE_NAME: &str = "_TemporaryColorTexture";

pub struct PixelatePass {
    label: String,
    kernel: KernelInfo,
    copy: Option<(TextureHandle, TextureDesc)>,
}

impl PixelatePass {
    pub fn new(label: &str, kernels: &KernelTable) -> Result<Self, BlurError> {
        Ok(Self {
            label: label.to_string(),
            kernel: kernels.require(Kernel::Pixelate)?,
            copy: None,
        })
    }

    /// Number of blocks covering `size`, partial blocks included
    pub fn block_grid(size: Size, block_size: u32) -> Size {
        let block_size = block_size.max(1);
        Size::new(size.width.div_ceil(block_size), size.height.div_ceil(block_size))
    }
}

impl<B: GpuBackend + ?Sized> PostProcessPass<B> for PixelatePass {
    type Config = PixelateConfig;

    fn label(&self) -> &str {
        &self.label
    }

    fn on_setup(&mut self, backend: &mut B, frame: &FrameInfo, _config: &PixelateConfig) -> Result<(), BlurError> {
        if self.copy.is_some_and(|(_, desc)| desc == frame.descriptor) {
            return Ok(());
        }
        if let Some((texture, _)) = self.copy.take() {
            backend.destroy_texture(texture)?;
        }
        let texture = backend.create_texture(COPY_TEXTURE_NAME, frame.descriptor)?;
        self.copy = Some((texture, frame.descriptor));
        Ok(())
    }

    fn execute(&mut self, backend: &mut B, frame: &FrameInfo, config: &PixelateConfig) -> Result<PassOutput, BlurError> {
        let Some((copy, _)) = self.copy else {
            return Ok(PassOutput::Skipped);
        };

        let mut scope = CommandScope::begin(backend, &self.label);
        scope.copy(frame.color_target, copy)?;

        let blocks = Self::block_grid(frame.size(), config.block_size);
        scope.dispatch(&Dispatch {
            kernel: Kernel::Pixelate,
            source: copy,
            target: frame.color_target,
            params: KernelParams::pixelate(frame.size(), config.block_size),
            groups: self.kernel.groups_for(blocks),
        })?;

        Ok(PassOutput::Composited)
    }

    fn dispose(&mut self, backend: &mut B) -> Result<(), BlurError> {
        match self.copy.take() {
            Some((texture, _)) => backend.destroy_texture(texture),
            None => Ok(()),
        }
    }
}
