//! In-memory backend that records every call instead of touching a GPU
//!
//! Textures are plain handles. Reads of anything that is not currently live
//! (released scratch, destroyed texture) are collected as violations rather
//! than failing, so a test can assert on the whole frame at once.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::backend::{
    CameraKind, Dispatch, FrameInfo, GpuBackend, Kernel, KernelInfo, ScratchKey, TextureDesc,
    TextureFormat, TextureHandle,
};
use crate::error::BlurError;
use crate::plan::Size;
use crate::pool::ScratchPool;

/// Default thread-group edge of the recorded kernels
pub const RECORDING_GROUP_SIZE: (u32, u32) = (8, 8);

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginScope(String),
    EndScope,
    Acquire { key: ScratchKey, texture: TextureHandle, size: Size },
    Release { key: ScratchKey, texture: TextureHandle },
    Create { label: String, texture: TextureHandle, size: Size },
    Destroy { texture: TextureHandle },
    Dispatch(Dispatch),
    Copy { source: TextureHandle, target: TextureHandle },
    Expose { name: String, texture: TextureHandle },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::BeginScope(label) => write!(f, "begin {}", label),
            Command::EndScope => write!(f, "end"),
            Command::Acquire { key, texture, size } => write!(
                f,
                "acquire  {:08x} -> #{} ({}x{})",
                key.0, texture.0, size.width, size.height
            ),
            Command::Release { key, texture } => write!(f, "release  {:08x} (#{})", key.0, texture.0),
            Command::Create { label, texture, size } => {
                write!(f, "create   {} -> #{} ({}x{})", label, texture.0, size.width, size.height)
            }
            Command::Destroy { texture } => write!(f, "destroy  #{}", texture.0),
            Command::Dispatch(d) => write!(
                f,
                "dispatch {:?} #{} -> #{} groups {}x{} ratio {:.4} offset {:.1}",
                d.kernel, d.source.0, d.target.0, d.groups.0, d.groups.1, d.params.blend_ratio, d.params.offset
            ),
            Command::Copy { source, target } => write!(f, "copy     #{} -> #{}", source.0, target.0),
            Command::Expose { name, texture } => write!(f, "expose   {} = #{}", name, texture.0),
        }
    }
}

pub struct RecordingBackend {
    commands: Vec<Command>,
    pool: ScratchPool<TextureHandle>,
    sizes: HashMap<TextureHandle, TextureDesc>,
    live: HashSet<TextureHandle>,
    missing: HashSet<Kernel>,
    violations: Vec<String>,
    next_handle: u32,
    depth: usize,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            pool: ScratchPool::new(),
            sizes: HashMap::new(),
            live: HashSet::new(),
            missing: HashSet::new(),
            violations: Vec::new(),
            next_handle: 0,
            depth: 0,
        }
    }

    /// Backend on which `kernel` fails to resolve
    pub fn without_kernel(mut self, kernel: Kernel) -> Self {
        self.missing.insert(kernel);
        self
    }

    /// Register a frame colour target of the given size
    pub fn frame(&mut self, size: Size, camera: CameraKind) -> FrameInfo {
        let descriptor = TextureDesc::new(size, TextureFormat::Rgba8Unorm);
        let color_target = self.allocate(descriptor);
        self.live.insert(color_target);
        FrameInfo {
            color_target,
            descriptor,
            camera,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.violations.clear();
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Dispatch(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    pub fn dispatches_of(&self, kernel: Kernel) -> Vec<Dispatch> {
        self.dispatches().into_iter().filter(|d| d.kernel == kernel).collect()
    }

    pub fn acquire_count(&self) -> usize {
        self.count(|c| matches!(c, Command::Acquire { .. }))
    }

    pub fn release_count(&self) -> usize {
        self.count(|c| matches!(c, Command::Release { .. }))
    }

    fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    pub fn outstanding_scratch(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn scratch_allocations(&self) -> usize {
        self.pool.allocations()
    }

    pub fn open_scopes(&self) -> usize {
        self.depth
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<Size> {
        self.sizes.get(&texture).map(|desc| desc.size)
    }

    pub fn is_live(&self, texture: TextureHandle) -> bool {
        self.live.contains(&texture)
    }

    fn allocate(&mut self, desc: TextureDesc) -> TextureHandle {
        let texture = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.sizes.insert(texture, desc);
        texture
    }

    fn check_live(&mut self, texture: TextureHandle, what: &str) {
        if !self.live.contains(&texture) {
            self.violations
                .push(format!("{} of #{} which is not live", what, texture.0));
        }
    }
}

impl GpuBackend for RecordingBackend {
    fn resolve_kernel(&self, kernel: Kernel) -> Option<KernelInfo> {
        (!self.missing.contains(&kernel)).then_some(KernelInfo {
            kernel,
            group_size: RECORDING_GROUP_SIZE,
        })
    }

    fn acquire_scratch(&mut self, key: ScratchKey, desc: TextureDesc) -> Result<TextureHandle, BlurError> {
        let mut next = self.next_handle;
        let texture = *self.pool.acquire(key, desc, |_| {
            let texture = TextureHandle(next);
            next += 1;
            Ok(texture)
        })?;
        if next != self.next_handle {
            self.next_handle = next;
            self.sizes.insert(texture, desc);
        }
        self.live.insert(texture);
        self.commands.push(Command::Acquire {
            key,
            texture,
            size: desc.size,
        });
        Ok(texture)
    }

    fn release_scratch(&mut self, key: ScratchKey) -> Result<(), BlurError> {
        let texture = *self.pool.get(key).ok_or(BlurError::UnknownScratch(key))?;
        self.pool.release(key)?;
        self.live.remove(&texture);
        self.commands.push(Command::Release { key, texture });
        Ok(())
    }

    fn trim_scratch(&mut self) -> Result<(), BlurError> {
        for texture in self.pool.trim() {
            self.sizes.remove(&texture);
            self.commands.push(Command::Destroy { texture });
        }
        Ok(())
    }

    fn create_texture(&mut self, label: &str, desc: TextureDesc) -> Result<TextureHandle, BlurError> {
        let texture = self.allocate(desc);
        self.live.insert(texture);
        self.commands.push(Command::Create {
            label: label.to_string(),
            texture,
            size: desc.size,
        });
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), BlurError> {
        if !self.live.remove(&texture) {
            return Err(BlurError::UnknownTexture(texture));
        }
        self.commands.push(Command::Destroy { texture });
        Ok(())
    }

    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), BlurError> {
        self.check_live(dispatch.source, "read");
        self.check_live(dispatch.target, "write");
        if dispatch.groups.0 == 0 || dispatch.groups.1 == 0 {
            self.violations
                .push(format!("empty dispatch of {:?}", dispatch.kernel));
        }
        self.commands.push(Command::Dispatch(*dispatch));
        Ok(())
    }

    fn copy(&mut self, source: TextureHandle, target: TextureHandle) -> Result<(), BlurError> {
        self.check_live(source, "copy");
        self.check_live(target, "copy");
        self.commands.push(Command::Copy { source, target });
        Ok(())
    }

    fn expose_named(&mut self, name: &str, texture: TextureHandle) -> Result<(), BlurError> {
        self.check_live(texture, "expose");
        self.commands.push(Command::Expose {
            name: name.to_string(),
            texture,
        });
        Ok(())
    }

    fn begin_scope(&mut self, label: &str) {
        self.depth += 1;
        self.commands.push(Command::BeginScope(label.to_string()));
    }

    fn end_scope(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.commands.push(Command::EndScope);
    }
}
