//! Pass interface and the feature wrapper that drives a pass each frame

use crate::backend::{FrameInfo, GpuBackend, KernelTable, TextureHandle};
use crate::config::{EffectConfig, PassEvent};
use crate::error::BlurError;

/// What a pass left behind for the rest of the frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutput {
    /// Nothing ran; the frame is untouched
    Skipped,
    /// Result was written onto the frame's colour target
    Composited,
    /// Result was published under `name`
    Exposed { name: String, texture: TextureHandle },
}

/// A post-processing stage.
///
/// `on_setup` runs before every `execute` and is where persistent resources
/// are (re)allocated; `dispose` frees them on teardown.
pub trait PostProcessPass<B: GpuBackend + ?Sized> {
    type Config: EffectConfig;

    fn label(&self) -> &str;

    fn on_setup(&mut self, backend: &mut B, frame: &FrameInfo, config: &Self::Config) -> Result<(), BlurError>;

    fn execute(&mut self, backend: &mut B, frame: &FrameInfo, config: &Self::Config) -> Result<PassOutput, BlurError>;

    fn dispose(&mut self, backend: &mut B) -> Result<(), BlurError>;
}

/// Owns one pass and decides whether it runs.
///
/// A pass whose kernels cannot be resolved is never built; the feature then
/// stays disabled and every frame renders unblurred.
pub struct BlurFeature<P> {
    name: String,
    pass: Option<P>,
}

impl<P> BlurFeature<P> {
    pub fn create(
        name: &str,
        kernels: &KernelTable,
        build: impl FnOnce(&str, &KernelTable) -> Result<P, BlurError>,
    ) -> Self {
        let pass = match build(name, kernels) {
            Ok(pass) => {
                log::info!("{}: created", name);
                Some(pass)
            }
            Err(e) => {
                log::warn!("{}: disabled ({})", name, e);
                None
            }
        };

        Self {
            name: name.to_string(),
            pass,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.pass.is_some()
    }

    pub fn pass(&self) -> Option<&P> {
        self.pass.as_ref()
    }

    /// Insertion point for this frame, `None` when the pass will not run
    pub fn pass_event<C: EffectConfig>(&self, config: Option<&C>) -> Option<PassEvent> {
        match (&self.pass, config) {
            (Some(_), Some(config)) if config.is_active() => Some(config.pass_event()),
            _ => None,
        }
    }

    /// Run the pass for one frame. A missing or inactive config is a no-op.
    pub fn render<B>(
        &mut self,
        backend: &mut B,
        frame: &FrameInfo,
        config: Option<&<P as PostProcessPass<B>>::Config>,
    ) -> Result<PassOutput, BlurError>
    where
        B: GpuBackend + ?Sized,
        P: PostProcessPass<B>,
    {
        let (Some(pass), Some(config)) = (self.pass.as_mut(), config) else {
            return Ok(PassOutput::Skipped);
        };
        if !config.is_active() {
            return Ok(PassOutput::Skipped);
        }

        pass.on_setup(backend, frame, config)?;
        pass.execute(backend, frame, config)
    }

    pub fn dispose<B>(&mut self, backend: &mut B) -> Result<(), BlurError>
    where
        B: GpuBackend + ?Sized,
        P: PostProcessPass<B>,
    {
        match self.pass.as_mut() {
            Some(pass) => pass.dispose(backend),
            None => Ok(()),
        }
    }
}
