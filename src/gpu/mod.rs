//! wgpu implementation of the blur backend
//!
//! Headless device setup, the compute kernels, and the `GpuBackend` that
//! records the passes' dispatches into command encoders.

pub mod backend;
pub mod context;
pub mod kernels;

pub use backend::WgpuBackend;
pub use context::GpuContext;
pub use kernels::{ComputeKernels, WORKGROUP_SIZE};
