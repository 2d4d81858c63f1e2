use std::path::PathBuf;

use thiserror::Error;

/// Failures of the GPU (or CPU fallback) overlay surface.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("no GPU adapter or device available")]
    GpuUnavailable,

    #[error("surface size {width}x{height} exceeds device limit {max}")]
    SurfaceTooLarge { width: u32, height: u32, max: u32 },

    #[error("surface has zero area")]
    EmptySurface,

    #[error("GPU readback failed: {0}")]
    Readback(String),
}

/// Failures while setting up an image feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("page size must be greater than 0")]
    EmptyPage,
}
