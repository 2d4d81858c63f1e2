use image::{Rgba, RgbaImage};
use tracing::trace;

use crate::error::OverlayError;
use crate::overlay::lod::OverlayFrame;

/// What kind of surfaces a factory can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Gpu,
    Cpu,
    Unavailable,
}

impl Capability {
    pub fn can_draw(self) -> bool {
        !matches!(self, Capability::Unavailable)
    }
}

/// A drawable overlay target exclusively owned by one cell.
pub trait OverlaySurface {
    fn size(&self) -> (u32, u32);

    /// Clears to transparent and draws `frame`.
    fn draw(&mut self, frame: &OverlayFrame) -> Result<(), OverlayError>;

    /// Copies the current contents into CPU memory.
    fn read_pixels(&self) -> Result<RgbaImage, OverlayError>;
}

pub trait SurfaceFactory {
    fn capability(&self) -> Capability;

    fn create(&self, width: u32, height: u32) -> Result<Box<dyn OverlaySurface>, OverlayError>;
}

/// Raster fallback for hosts without a usable GPU.
pub struct CpuSurface {
    image: RgbaImage,
}

impl CpuSurface {
    pub fn new(width: u32, height: u32) -> Result<Self, OverlayError> {
        if width == 0 || height == 0 {
            return Err(OverlayError::EmptySurface);
        }
        Ok(Self {
            image: RgbaImage::new(width, height),
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

impl OverlaySurface for CpuSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn draw(&mut self, frame: &OverlayFrame) -> Result<(), OverlayError> {
        let (w, h) = self.image.dimensions();
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }

        let rects = frame.outline_rects();
        for rect in &rects {
            let x0 = rect.x0.floor().clamp(0.0, w as f32) as u32;
            let y0 = rect.y0.floor().clamp(0.0, h as f32) as u32;
            let x1 = rect.x1.ceil().clamp(0.0, w as f32) as u32;
            let y1 = rect.y1.ceil().clamp(0.0, h as f32) as u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    self.image.put_pixel(x, y, Rgba(rect.color.0));
                }
            }
        }
        trace!(rects = rects.len(), w, h, "CPU overlay drawn");
        Ok(())
    }

    fn read_pixels(&self) -> Result<RgbaImage, OverlayError> {
        Ok(self.image.clone())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CpuSurfaceFactory;

impl SurfaceFactory for CpuSurfaceFactory {
    fn capability(&self) -> Capability {
        Capability::Cpu
    }

    fn create(&self, width: u32, height: u32) -> Result<Box<dyn OverlaySurface>, OverlayError> {
        Ok(Box::new(CpuSurface::new(width, height)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LodSettings;
    use crate::models::{BoundingBox, BoxColor};

    #[test]
    fn test_cpu_surface_draws_outline_only() {
        let red = BoxColor::from_hex("#ff0000").unwrap();
        let boxes = vec![BoundingBox::new(0.1, 0.1, 0.9, 0.9, red)];
        let frame = OverlayFrame::build(&boxes, 100.0, 100.0, LodSettings::default());

        let mut surface = CpuSurface::new(100, 100).unwrap();
        surface.draw(&frame).unwrap();
        let img = surface.read_pixels().unwrap();

        assert_eq!(img.get_pixel(10, 50).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(50, 10).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(50, 50).0, [0, 0, 0, 0]);
        assert_eq!(img.get_pixel(2, 2).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_redraw_clears_previous_frame() {
        let boxes = vec![BoundingBox::new(0.0, 0.0, 0.5, 0.5, BoxColor::DEFAULT)];
        let mut surface = CpuSurface::new(50, 50).unwrap();
        surface
            .draw(&OverlayFrame::build(&boxes, 50.0, 50.0, LodSettings::default()))
            .unwrap();
        assert_ne!(surface.image().get_pixel(0, 0).0[3], 0);

        surface
            .draw(&OverlayFrame::build(&[], 50.0, 50.0, LodSettings::default()))
            .unwrap();
        assert!(surface.image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_zero_sized_surface_rejected() {
        assert!(matches!(
            CpuSurfaceFactory.create(0, 10),
            Err(OverlayError::EmptySurface)
        ));
    }
}
