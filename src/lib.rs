//! Dual-Kawase and Kawase blur passes for a real-time post-processing chain
//!
//! The passes only orchestrate: they derive a plan from the per-frame
//! settings, request scratch textures, and issue ordered compute dispatches
//! against a [`GpuBackend`]. [`gpu::WgpuBackend`] runs them on wgpu;
//! [`recording::RecordingBackend`] records them for inspection.

pub mod backend;
pub mod config;
pub mod dual_kawase;
pub mod error;
pub mod gpu;
pub mod image;
pub mod kawase;
pub mod pass;
pub mod pixelate;
pub mod plan;
pub mod pool;
pub mod recording;

#[cfg(test)]
mod tests;

// Re-export public API
pub use backend::{
    CameraKind, CommandScope, Dispatch, FrameInfo, GpuBackend, Kernel, KernelInfo, KernelParams,
    KernelTable, ScratchKey, TextureDesc, TextureFormat, TextureHandle,
};
pub use config::{DualKawaseConfig, EffectConfig, KawaseConfig, OutputMode, PassEvent, PixelateConfig};
pub use dual_kawase::DualKawasePass;
pub use error::BlurError;
pub use image::{ImageError, RgbaImage};
pub use kawase::KawasePass;
pub use pass::{BlurFeature, PassOutput, PostProcessPass};
pub use pixelate::PixelatePass;
pub use plan::{BlurPlan, Size, group_count, half_size, texel_size_params};
pub use pool::ScratchPool;
