//! Tests for the blur passes
//!
//! Everything except `gpu` runs against the recording backend.

mod dual_kawase;
mod image;
mod pool;

use crate::recording::{Command, RecordingBackend};
use crate::{CameraKind, FrameInfo, KernelTable, Size};

/// Frame size with odd dimensions, so every halving rounds
pub(crate) const ODD_FRAME: Size = Size::new(1920, 1081);

pub(crate) fn backend_with_frame(size: Size) -> (RecordingBackend, FrameInfo, KernelTable) {
    let mut backend = RecordingBackend::new();
    let frame = backend.frame(size, CameraKind::Game);
    let kernels = KernelTable::resolve(&backend);
    (backend, frame, kernels)
}

/// Scope labels in issue order
pub(crate) fn scope_labels(backend: &RecordingBackend) -> Vec<String> {
    backend
        .commands()
        .iter()
        .filter_map(|command| match command {
            Command::BeginScope(label) => Some(label.clone()),
            _ => None,
        })
        .collect()
}
