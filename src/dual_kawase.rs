//! Dual-Kawase blur over a pyramid of scratch textures
//!
//! 1. Downsample the frame `iterations + 1` times, halving (rounded up) each time
//! 2. Upsample back toward full resolution, level by level
//! 3. At the top of the walk, blend the two deepest results by the fractional
//!    part of `log2(radius * intensity + 1)`
//!
//! The blend is what lets a continuous strength value drive a discrete
//! pyramid without visible steps. Every scratch texture is released in the
//! same frame, in reverse order of use.

use crate::backend::{
    CommandScope, Dispatch, FrameInfo, GpuBackend, Kernel, KernelInfo, KernelParams, KernelTable,
    ScratchKey, TextureDesc, TextureHandle,
};
use crate::config::{DualKawaseConfig, OutputMode};
use crate::error::BlurError;
use crate::pass::{PassOutput, PostProcessPass};
use crate::plan::{BlurPlan, Size, half_size};

/// Name every pyramid level key is derived from
pub const PYRAMID_TEXTURE_NAME: &str = "_DualKawaseLevel";

/// Key name of the full-resolution output. The configured target name is
/// only used to expose the result, never as a pool key.
pub const FINAL_TEXTURE_NAME: &str = "_DualKawaseFinal";

#[derive(Copy, Clone, Debug)]
struct DualKawaseKernels {
    downsample: KernelInfo,
    upsample: KernelInfo,
    blend: KernelInfo,
}

/// One scratch texture owned by the pyramid for the current frame
#[derive(Copy, Clone, Debug)]
struct Slot {
    key: ScratchKey,
    texture: TextureHandle,
    size: Size,
}

/// Slots live at stable indices; levels map onto slots. Swapping which slot
/// backs a level is how the blend result takes over a level without a copy.
///
/// The pyramid also tracks which keys are still acquired, so a frame that
/// fails halfway can hand everything back to the pool.
#[derive(Default)]
struct Pyramid {
    slots: Vec<Slot>,
    levels: Vec<usize>,
    held: Vec<ScratchKey>,
}

impl Pyramid {
    fn acquire<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: ScratchKey,
        desc: TextureDesc,
    ) -> Result<Slot, BlurError> {
        let texture = backend.acquire_scratch(key, desc)?;
        self.held.push(key);
        Ok(Slot {
            key,
            texture,
            size: desc.size,
        })
    }

    fn release<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, key: ScratchKey) -> Result<(), BlurError> {
        self.held.retain(|held| *held != key);
        backend.release_scratch(key)
    }

    /// Release every key still held, newest first
    fn release_held<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        for key in self.held.drain(..).rev() {
            if let Err(e) = backend.release_scratch(key) {
                log::warn!("failed to release scratch {:?}: {}", key, e);
            }
        }
    }

    fn push_level(&mut self, slot: Slot) {
        self.levels.push(self.slots.len());
        self.slots.push(slot);
    }

    /// Slot that belongs to no level yet
    fn push_spare(&mut self, slot: Slot) -> usize {
        self.slots.push(slot);
        self.slots.len() - 1
    }

    fn level(&self, index: usize) -> Slot {
        self.slots[self.levels[index]]
    }

    fn slot(&self, index: usize) -> Slot {
        self.slots[index]
    }

    /// Make `spare` back `level`, and the level's old slot the new spare
    fn swap_level(&mut self, level: usize, spare: &mut usize) {
        std::mem::swap(&mut self.levels[level], spare);
    }
}

pub struct DualKawasePass {
    label: String,
    kernels: DualKawaseKernels,
}

impl DualKawasePass {
    /// Fails when any of the three kernels is missing
    pub fn new(label: &str, kernels: &KernelTable) -> Result<Self, BlurError> {
        Ok(Self {
            label: label.to_string(),
            kernels: DualKawaseKernels {
                downsample: kernels.require(Kernel::Downsample)?,
                upsample: kernels.require(Kernel::Upsample)?,
                blend: kernels.require(Kernel::LinearBlend)?,
            },
        })
    }

    /// Record one frame's worth of work against `backend`.
    ///
    /// On error every scratch texture acquired so far is released before
    /// returning, so the next frame starts from a balanced pool.
    pub fn run<B: GpuBackend + ?Sized>(
        &self,
        backend: &mut B,
        frame: &FrameInfo,
        config: &DualKawaseConfig,
    ) -> Result<PassOutput, BlurError> {
        let plan = BlurPlan::new(config.radius, config.intensity);
        log::debug!(
            "{}: factor {:.2}, {} iterations, blend {:.4}",
            self.label,
            plan.blur_factor,
            plan.iterations,
            plan.blend_ratio
        );

        let mut scope = CommandScope::begin(backend, &self.label);
        let mut pyramid = Pyramid::default();
        let result = self.walk(&mut scope, &mut pyramid, &plan, frame, config);
        if result.is_err() {
            pyramid.release_held(&mut *scope);
        }
        result
    }

    fn walk<B: GpuBackend + ?Sized>(
        &self,
        scope: &mut CommandScope<'_, B>,
        pyramid: &mut Pyramid,
        plan: &BlurPlan,
        frame: &FrameInfo,
        config: &DualKawaseConfig,
    ) -> Result<PassOutput, BlurError> {
        let desc = frame.descriptor;

        // level 0: final output at full resolution
        let output = pyramid.acquire(&mut **scope, ScratchKey::named(FINAL_TEXTURE_NAME), desc)?;
        pyramid.push_level(output);

        // downsample walk
        let mut source = frame.color_target;
        let mut source_size = desc.size;
        for i in 0..=plan.iterations {
            let key = ScratchKey::indexed(PYRAMID_TEXTURE_NAME, i);
            let size = half_size(source_size);
            let level = pyramid.acquire(&mut **scope, key, desc.with_size(size))?;
            pyramid.push_level(level);

            self.downsample(scope, source, level.texture, size)?;

            source = level.texture;
            source_size = size;
        }

        if plan.is_degenerate() {
            let level = pyramid.level(1);
            let output = pyramid.level(0);
            self.upsample(scope, level.texture, output.texture, output.size)?;
            pyramid.release(&mut **scope, level.key)?;
            self.blend(scope, frame.color_target, output.texture, output.size, plan.blend_ratio)?;
        } else {
            // upsample walk, starting from the coarsest level
            let top = plan.iterations as usize + 1;
            let spare_size = pyramid.level(top - 1).size;
            let spare_key = ScratchKey::indexed(PYRAMID_TEXTURE_NAME, top as u32);
            let spare_slot = pyramid.acquire(&mut **scope, spare_key, desc.with_size(spare_size))?;
            let mut spare = pyramid.push_spare(spare_slot);

            for i in (1..=top).rev() {
                let source = pyramid.level(i);
                let below = pyramid.level(i - 1);

                if i == top {
                    let intermediate = pyramid.slot(spare);
                    self.upsample(scope, source.texture, intermediate.texture, below.size)?;
                    self.blend(scope, below.texture, intermediate.texture, below.size, plan.blend_ratio)?;
                    pyramid.swap_level(i - 1, &mut spare);
                } else {
                    self.upsample(scope, source.texture, below.texture, below.size)?;
                }

                pyramid.release(&mut **scope, source.key)?;
            }

            let spare_key = pyramid.slot(spare).key;
            pyramid.release(&mut **scope, spare_key)?;
        }

        let output = pyramid.level(0);
        let result = match config.output {
            OutputMode::CopyToFrame => {
                scope.composite_to_frame(output.texture, frame)?;
                PassOutput::Composited
            }
            OutputMode::Expose => {
                scope.expose_named(&config.target_name, output.texture)?;
                PassOutput::Exposed {
                    name: config.target_name.clone(),
                    texture: output.texture,
                }
            }
        };
        pyramid.release(&mut **scope, output.key)?;

        Ok(result)
    }

    fn downsample<B: GpuBackend + ?Sized>(
        &self,
        scope: &mut CommandScope<'_, B>,
        source: TextureHandle,
        target: TextureHandle,
        target_size: Size,
    ) -> Result<(), BlurError> {
        let mut scope = scope.nested("DownSample Blur");
        scope.dispatch(&Dispatch {
            kernel: Kernel::Downsample,
            source,
            target,
            params: KernelParams::resample(target_size),
            groups: self.kernels.downsample.groups_for(target_size),
        })
    }

    fn upsample<B: GpuBackend + ?Sized>(
        &self,
        scope: &mut CommandScope<'_, B>,
        source: TextureHandle,
        target: TextureHandle,
        target_size: Size,
    ) -> Result<(), BlurError> {
        let mut scope = scope.nested("UpSample Blur");
        scope.dispatch(&Dispatch {
            kernel: Kernel::Upsample,
            source,
            target,
            params: KernelParams::resample(target_size),
            groups: self.kernels.upsample.groups_for(target_size),
        })
    }

    /// `target = mix(source, target, ratio)`
    fn blend<B: GpuBackend + ?Sized>(
        &self,
        scope: &mut CommandScope<'_, B>,
        source: TextureHandle,
        target: TextureHandle,
        size: Size,
        ratio: f32,
    ) -> Result<(), BlurError> {
        let mut scope = scope.nested("Linear Blend");
        scope.dispatch(&Dispatch {
            kernel: Kernel::LinearBlend,
            source,
            target,
            params: KernelParams::blend(size, ratio),
            groups: self.kernels.blend.groups_for(size),
        })
    }
}

impl<B: GpuBackend + ?Sized> PostProcessPass<B> for DualKawasePass {
    type Config = DualKawaseConfig;

    fn label(&self) -> &str {
        &self.label
    }

    // Nothing persists between frames
    fn on_setup(&mut self, _backend: &mut B, _frame: &FrameInfo, _config: &DualKawaseConfig) -> Result<(), BlurError> {
        Ok(())
    }

    fn execute(&mut self, backend: &mut B, frame: &FrameInfo, config: &DualKawaseConfig) -> Result<PassOutput, BlurError> {
        self.run(backend, frame, config)
    }

    fn dispose(&mut self, _backend: &mut B) -> Result<(), BlurError> {
        Ok(())
    }
}
