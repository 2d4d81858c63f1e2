use std::rc::Rc;

use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::config::LodSettings;
use crate::error::OverlayError;
use crate::models::BoundingBox;
use crate::overlay::lod::OverlayFrame;
use crate::overlay::surface::{Capability, OverlaySurface, SurfaceFactory};

/// Result of one [`LodOverlayRenderer::render`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Drawn { boxes: usize, reduced: bool },
    /// Same inputs as the previous draw; the surface already shows them.
    Unchanged,
    /// Zero-sized input; the surface was released.
    Released,
    /// No usable surface. Nothing was drawn.
    Unavailable,
}

/// Draws one cell's annotation boxes, all of them or a top-K subset
/// depending on the rendered width.
pub struct LodOverlayRenderer {
    factory: Rc<dyn SurfaceFactory>,
    settings: LodSettings,
    surface: Option<Box<dyn OverlaySurface>>,
    signature: Option<u64>,
    failed: bool,
    draws: u64,
}

impl LodOverlayRenderer {
    pub fn new(factory: Rc<dyn SurfaceFactory>, settings: LodSettings) -> Self {
        Self {
            factory,
            settings,
            surface: None,
            signature: None,
            failed: false,
            draws: 0,
        }
    }

    /// False once surface creation or drawing has failed, or when the
    /// factory has nothing to offer.
    pub fn is_available(&self) -> bool {
        !self.failed && self.factory.capability().can_draw()
    }

    pub fn capability(&self) -> Capability {
        if self.failed {
            Capability::Unavailable
        } else {
            self.factory.capability()
        }
    }

    pub fn set_settings(&mut self, settings: LodSettings) {
        self.settings = settings;
    }

    pub fn surface(&self) -> Option<&dyn OverlaySurface> {
        self.surface.as_deref()
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Renders `boxes` for an image displayed at `width x height`.
    pub fn render(&mut self, boxes: &[BoundingBox], width: f32, height: f32) -> RenderOutcome {
        let (surface_w, surface_h) = (pixel_extent(width), pixel_extent(height));
        if surface_w == 0 || surface_h == 0 {
            self.release();
            return RenderOutcome::Released;
        }
        if !self.is_available() {
            return RenderOutcome::Unavailable;
        }

        let signature = self.signature_of(boxes, width, height);
        if self.signature == Some(signature) && self.surface.is_some() {
            return RenderOutcome::Unchanged;
        }

        let needs_surface = self
            .surface
            .as_ref()
            .map_or(true, |s| s.size() != (surface_w, surface_h));
        if needs_surface {
            self.release();
            match self.factory.create(surface_w, surface_h) {
                Ok(surface) => self.surface = Some(surface),
                Err(e) => return self.degrade(e),
            }
        }

        let frame = OverlayFrame::build(boxes, width, height, self.settings);
        let Some(surface) = self.surface.as_mut() else {
            return RenderOutcome::Unavailable;
        };
        if let Err(e) = surface.draw(&frame) {
            return self.degrade(e);
        }

        self.signature = Some(signature);
        self.draws += 1;
        trace!(
            boxes = frame.boxes.len(),
            reduced = frame.reduced,
            surface_w,
            surface_h,
            "Overlay drawn"
        );
        RenderOutcome::Drawn {
            boxes: frame.boxes.len(),
            reduced: frame.reduced,
        }
    }

    /// Drops the surface and its GPU resources.
    pub fn release(&mut self) {
        self.surface = None;
        self.signature = None;
    }

    /// Size errors only skip this frame. Anything else disables the
    /// renderer for good.
    fn degrade(&mut self, error: OverlayError) -> RenderOutcome {
        self.release();
        match error {
            OverlayError::SurfaceTooLarge { .. } | OverlayError::EmptySurface => {
                debug!("Overlay skipped at this size: {}", error);
            }
            _ => {
                warn!("Overlay rendering disabled: {}", error);
                self.failed = true;
            }
        }
        RenderOutcome::Unavailable
    }

    fn signature_of(&self, boxes: &[BoundingBox], width: f32, height: f32) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(&width.to_bits().to_le_bytes());
        hasher.update(&height.to_bits().to_le_bytes());
        hasher.update(&self.settings.threshold_px.to_bits().to_le_bytes());
        hasher.update(&(self.settings.max_boxes as u64).to_le_bytes());
        for b in boxes {
            for v in [b.x_min, b.y_min, b.x_max, b.y_max] {
                hasher.update(&v.to_bits().to_le_bytes());
            }
            hasher.update(&b.color.0);
        }
        hasher.digest()
    }
}

impl Drop for LodOverlayRenderer {
    fn drop(&mut self) {
        self.release();
    }
}

fn pixel_extent(v: f32) -> u32 {
    if v.is_finite() && v >= 0.5 {
        v.round() as u32
    } else {
        0
    }
}
