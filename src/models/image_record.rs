use std::fmt;
use std::sync::Arc;

/// Stable identifier of an image within a collection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// RGBA display colour of an annotation box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxColor(pub [u8; 4]);

impl BoxColor {
    pub const DEFAULT: BoxColor = BoxColor([0x00, 0xff, 0x88, 0xff]);

    /// Parses `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(input: &str) -> Option<Self> {
        let hex = input.trim().trim_start_matches('#');
        if hex.len() != 6 && hex.len() != 8 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        let alpha = if hex.len() == 8 { channel(6)? } else { 0xff };
        Some(Self([channel(0)?, channel(2)?, channel(4)?, alpha]))
    }

    pub fn to_f32(self) -> [f32; 4] {
        let [r, g, b, a] = self.0;
        [
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        ]
    }
}

impl Default for BoxColor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Annotation box in image-relative coordinates, `[0,1] x [0,1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub color: BoxColor,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32, color: BoxColor) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
            color,
        }
    }

    /// Returns the box with coordinates clamped to the unit square and
    /// min/max swapped where they arrive inverted. NaN collapses to 0.
    pub fn normalized(&self) -> Self {
        let unit = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let (x0, x1) = (unit(self.x_min), unit(self.x_max));
        let (y0, y1) = (unit(self.y_min), unit(self.y_max));
        Self {
            x_min: x0.min(x1),
            y_min: y0.min(y1),
            x_max: x0.max(x1),
            y_max: y0.max(y1),
            color: self.color,
        }
    }

    /// Normalized area, `(x_max - x_min) * (y_max - y_min)`.
    pub fn area(&self) -> f32 {
        let b = self.normalized();
        (b.x_max - b.x_min) * (b.y_max - b.y_min)
    }
}

/// Downstream data attached to an image. Opaque to the layout engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImagePayload {
    pub boxes: Vec<BoundingBox>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: ImageId,
    pub width: u32,
    pub height: u32,
    pub payload: Arc<ImagePayload>,
}

impl ImageRecord {
    /// Create a record without annotations.
    pub fn new(id: ImageId, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            payload: Arc::new(ImagePayload::default()),
        }
    }

    pub fn with_payload(mut self, payload: ImagePayload) -> Self {
        self.payload = Arc::new(payload);
        self
    }

    /// Width / height. Degenerate dimensions fall back to a square tile.
    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.payload.boxes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio() {
        assert!((ImageRecord::new(ImageId(1), 1920, 1080).aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
        assert_eq!(ImageRecord::new(ImageId(2), 0, 1080).aspect_ratio(), 1.0);
        assert_eq!(ImageRecord::new(ImageId(3), 1920, 0).aspect_ratio(), 1.0);
    }

    #[test]
    fn test_color_from_hex() {
        assert_eq!(
            BoxColor::from_hex("#ff8000"),
            Some(BoxColor([0xff, 0x80, 0x00, 0xff]))
        );
        assert_eq!(
            BoxColor::from_hex("10203040"),
            Some(BoxColor([0x10, 0x20, 0x30, 0x40]))
        );
        assert_eq!(BoxColor::from_hex("#fff"), None);
        assert_eq!(BoxColor::from_hex("#gg0000"), None);
    }

    #[test]
    fn test_box_normalization() {
        let b = BoundingBox::new(0.8, 1.4, -0.2, 0.5, BoxColor::DEFAULT).normalized();
        assert_eq!((b.x_min, b.x_max), (0.0, 0.8));
        assert_eq!((b.y_min, b.y_max), (0.5, 1.0));
        assert!((b.area() - 0.4).abs() < 1e-6);
    }
}
