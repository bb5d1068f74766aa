//! Error types shared by the passes and backends

use crate::backend::{Kernel, ScratchKey, TextureHandle};
use crate::image::ImageError;

#[derive(thiserror::Error, Debug)]
pub enum BlurError {
    /// A compute kernel could not be resolved when the pass was created.
    #[error("compute kernel {0:?} is not available")]
    MissingKernel(Kernel),

    #[error("scratch texture {0:?} released without a matching acquire")]
    UnknownScratch(ScratchKey),

    #[error("scratch texture {0:?} acquired twice without a release")]
    ScratchInUse(ScratchKey),

    #[error("texture {0:?} is not owned by this backend")]
    UnknownTexture(TextureHandle),

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error(transparent)]
    Image(#[from] ImageError),
}
