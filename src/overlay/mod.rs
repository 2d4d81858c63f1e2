//! Annotation overlays drawn on top of grid cells.

pub mod gpu;
pub mod lod;
pub mod renderer;
pub mod surface;

use std::rc::Rc;

use tracing::info;

pub use gpu::{GpuContext, GpuSurface, GpuSurfaceFactory};
pub use lod::{select_boxes, stroke_width, OverlayFrame};
pub use renderer::{LodOverlayRenderer, RenderOutcome};
pub use surface::{Capability, CpuSurface, CpuSurfaceFactory, OverlaySurface, SurfaceFactory};

/// Picks the GPU factory when the probe succeeds. Otherwise falls back to
/// CPU rasterisation if allowed, or to a factory that draws nothing.
pub fn default_factory(allow_cpu_fallback: bool) -> Rc<dyn SurfaceFactory> {
    let gpu = GpuSurfaceFactory::new();
    if gpu.capability() == Capability::Gpu || !allow_cpu_fallback {
        return Rc::new(gpu);
    }
    info!("Using CPU overlay surfaces");
    Rc::new(CpuSurfaceFactory)
}
