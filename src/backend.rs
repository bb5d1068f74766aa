//! The boundary between the blur passes and whatever actually owns the GPU
//!
//! Passes never touch device objects directly. They ask a [`GpuBackend`] for
//! textures, issue [`Dispatch`] records against it, and hand results back as
//! either a composite onto the frame or a named resource.

use std::ops::{Deref, DerefMut};

use crate::error::BlurError;
use crate::plan::{Size, group_count};

/// Opaque texture reference handed out by a backend
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
}

/// Allocation descriptor for frame and scratch textures
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub size: Size,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub fn new(size: Size, format: TextureFormat) -> Self {
        Self { size, format }
    }

    pub fn with_size(self, size: Size) -> Self {
        Self { size, ..self }
    }
}

/// Integer key of a pooled scratch texture.
///
/// Derived from a resource name, optionally suffixed with a pyramid index,
/// so that `indexed("_Level", 3)` and `named("_Level3")` are the same key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScratchKey(pub u32);

impl ScratchKey {
    pub fn named(name: &str) -> Self {
        Self(fnv1a(name.bytes()))
    }

    pub fn indexed(name: &str, index: u32) -> Self {
        let suffix = index.to_string();
        Self(fnv1a(name.bytes().chain(suffix.bytes())))
    }
}

fn fnv1a(bytes: impl Iterator<Item = u8>) -> u32 {
    bytes.fold(0x811c_9dc5, |hash, byte| {
        (hash ^ byte as u32).wrapping_mul(0x0100_0193)
    })
}

/// The fixed set of compute kernels the passes dispatch
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    Downsample,
    Upsample,
    LinearBlend,
    KawaseBlur,
    Pixelate,
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::Downsample,
        Kernel::Upsample,
        Kernel::LinearBlend,
        Kernel::KawaseBlur,
        Kernel::Pixelate,
    ];

    /// Shader entry point implementing this kernel
    pub fn entry_point(self) -> &'static str {
        match self {
            Kernel::Downsample => "downsample_main",
            Kernel::Upsample => "upsample_main",
            Kernel::LinearBlend => "lerp_main",
            Kernel::KawaseBlur => "kawase_main",
            Kernel::Pixelate => "pixelate_main",
        }
    }
}

/// A kernel resolved against a backend, with its thread-group size
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KernelInfo {
    pub kernel: Kernel,
    pub group_size: (u32, u32),
}

impl KernelInfo {
    pub fn groups_for(&self, size: Size) -> (u32, u32) {
        group_count(size, self.group_size)
    }
}

/// Kernels looked up once at initialization and passed to each pass
/// constructor. Missing entries stay `None`; passes that need them refuse
/// to build.
#[derive(Clone, Debug, Default)]
pub struct KernelTable {
    entries: Vec<KernelInfo>,
}

impl KernelTable {
    pub fn resolve<B: GpuBackend + ?Sized>(backend: &B) -> Self {
        let entries = Kernel::ALL
            .iter()
            .filter_map(|&kernel| backend.resolve_kernel(kernel))
            .collect();
        Self { entries }
    }

    pub fn get(&self, kernel: Kernel) -> Option<KernelInfo> {
        self.entries.iter().copied().find(|info| info.kernel == kernel)
    }

    pub fn require(&self, kernel: Kernel) -> Result<KernelInfo, BlurError> {
        self.get(kernel).ok_or(BlurError::MissingKernel(kernel))
    }
}

/// Uniform block shared by every kernel. Each kernel reads the fields it
/// needs and ignores the rest.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelParams {
    /// Reciprocal of the texture the kernel samples offsets in
    pub texel_size: [f32; 2],
    /// Dimensions of the target, for bounds checks
    pub target_size: [u32; 2],
    pub blend_ratio: f32,
    /// Kawase sample offset in texels
    pub offset: f32,
    pub block_size: u32,
    pub _padding: u32,
}

impl KernelParams {
    /// Downsample/upsample: offsets measured in target texels
    pub fn resample(target: Size) -> Self {
        Self {
            texel_size: crate::plan::texel_size_params(target),
            target_size: [target.width, target.height],
            ..Default::default()
        }
    }

    pub fn blend(size: Size, blend_ratio: f32) -> Self {
        Self {
            texel_size: crate::plan::texel_size_params(size),
            target_size: [size.width, size.height],
            blend_ratio,
            ..Default::default()
        }
    }

    pub fn kawase(source: Size, target: Size, offset: f32) -> Self {
        Self {
            texel_size: crate::plan::texel_size_params(source),
            target_size: [target.width, target.height],
            offset,
            ..Default::default()
        }
    }

    pub fn pixelate(size: Size, block_size: u32) -> Self {
        Self {
            texel_size: crate::plan::texel_size_params(size),
            target_size: [size.width, size.height],
            block_size,
            ..Default::default()
        }
    }
}

/// One compute dispatch: read `source`, write `target`
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Dispatch {
    pub kernel: Kernel,
    pub source: TextureHandle,
    pub target: TextureHandle,
    pub params: KernelParams,
    pub groups: (u32, u32),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CameraKind {
    Game,
    SceneView,
    /// Material/asset preview cameras; the ping-pong blur skips these
    Preview,
}

/// What the frame scheduler hands a pass for the current frame
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameInfo {
    pub color_target: TextureHandle,
    pub descriptor: TextureDesc,
    pub camera: CameraKind,
}

impl FrameInfo {
    pub fn size(&self) -> Size {
        self.descriptor.size
    }
}

/// GPU capabilities the passes need.
///
/// Every call is recorded in issue order; implementations must not reorder
/// dispatches, since each one consumes the texture written by the previous.
pub trait GpuBackend {
    /// Look up a kernel. `None` means the kernel cannot be used.
    fn resolve_kernel(&self, kernel: Kernel) -> Option<KernelInfo>;

    /// Take a transient texture from the pool for use within this frame
    fn acquire_scratch(&mut self, key: ScratchKey, desc: TextureDesc) -> Result<TextureHandle, BlurError>;

    /// Return a transient texture; its memory may back a later request
    fn release_scratch(&mut self, key: ScratchKey) -> Result<(), BlurError>;

    /// Destroy every pooled texture not currently acquired
    fn trim_scratch(&mut self) -> Result<(), BlurError>;

    /// Allocate a texture that outlives the frame
    fn create_texture(&mut self, label: &str, desc: TextureDesc) -> Result<TextureHandle, BlurError>;

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), BlurError>;

    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), BlurError>;

    fn copy(&mut self, source: TextureHandle, target: TextureHandle) -> Result<(), BlurError>;

    /// Write `texture` back onto the frame's colour target
    fn composite_to_frame(&mut self, texture: TextureHandle, frame: &FrameInfo) -> Result<(), BlurError> {
        self.copy(texture, frame.color_target)
    }

    /// Publish `texture` under `name` for later passes to sample
    fn expose_named(&mut self, name: &str, texture: TextureHandle) -> Result<(), BlurError>;

    fn begin_scope(&mut self, label: &str);

    fn end_scope(&mut self);
}

/// Open command/profiling segment. The segment is closed when the guard
/// drops, so early returns and `?` never leave it dangling.
pub struct CommandScope<'a, B: GpuBackend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: GpuBackend + ?Sized> CommandScope<'a, B> {
    pub fn begin(backend: &'a mut B, label: &str) -> Self {
        backend.begin_scope(label);
        Self { backend }
    }

    /// Nested segment, closed before this one
    pub fn nested(&mut self, label: &str) -> CommandScope<'_, B> {
        CommandScope::begin(&mut *self.backend, label)
    }
}

impl<B: GpuBackend + ?Sized> Deref for CommandScope<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: GpuBackend + ?Sized> DerefMut for CommandScope<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: GpuBackend + ?Sized> Drop for CommandScope<'_, B> {
    fn drop(&mut self) {
        self.backend.end_scope();
    }
}
