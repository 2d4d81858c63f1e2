//! Level-of-detail selection for annotation overlays.
//!
//! Small thumbnails cannot show hundreds of outlines legibly, so below a
//! width threshold only the largest boxes are drawn.

use crate::config::LodSettings;
use crate::models::{BoundingBox, BoxColor};

/// Outline stroke width for an image rendered `width` pixels wide.
pub fn stroke_width(width: f32) -> f32 {
    if width.is_finite() {
        (width / 100.0).clamp(1.0, 3.0)
    } else {
        1.0
    }
}

/// Whether an image of this width draws a reduced box set.
pub fn is_reduced(box_count: usize, width: f32, settings: LodSettings) -> bool {
    width < settings.threshold_px && box_count > settings.max_boxes
}

/// Indices of the boxes to draw, in their original order.
///
/// When reduced, keeps the `max_boxes` boxes with the largest normalised
/// area; equal areas keep the earlier box.
pub fn select_boxes(boxes: &[BoundingBox], width: f32, settings: LodSettings) -> Vec<usize> {
    if !is_reduced(boxes.len(), width, settings) {
        return (0..boxes.len()).collect();
    }

    let mut ranked: Vec<(usize, f32)> = boxes
        .iter()
        .enumerate()
        .map(|(i, b)| (i, b.area()))
        .collect();
    // Stable sort, so ties stay in input order.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(settings.max_boxes);

    let mut picked: Vec<usize> = ranked.into_iter().map(|(i, _)| i).collect();
    picked.sort_unstable();
    picked
}

/// A box mapped to surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub color: BoxColor,
}

/// A filled axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub color: BoxColor,
}

/// Everything a surface needs to draw one overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFrame {
    pub width: f32,
    pub height: f32,
    pub stroke_width: f32,
    pub boxes: Vec<PixelBox>,
    pub reduced: bool,
}

impl OverlayFrame {
    /// Maps the selected boxes onto a `width x height` surface.
    pub fn build(boxes: &[BoundingBox], width: f32, height: f32, settings: LodSettings) -> Self {
        let picked = select_boxes(boxes, width, settings);
        let reduced = picked.len() < boxes.len();
        let pixel_boxes = picked
            .into_iter()
            .map(|i| {
                let b = boxes[i].normalized();
                PixelBox {
                    x0: b.x_min * width,
                    y0: b.y_min * height,
                    x1: b.x_max * width,
                    y1: b.y_max * height,
                    color: b.color,
                }
            })
            .collect();

        Self {
            width,
            height,
            stroke_width: stroke_width(width),
            boxes: pixel_boxes,
            reduced,
        }
    }

    /// Outline geometry: four edge rectangles per box, drawn inside the
    /// box. Boxes thinner than two strokes collapse to one filled rect.
    pub fn outline_rects(&self) -> Vec<PixelRect> {
        let s = self.stroke_width;
        let mut rects = Vec::with_capacity(self.boxes.len() * 4);
        for b in &self.boxes {
            let rect = |x0, y0, x1, y1| PixelRect {
                x0,
                y0,
                x1,
                y1,
                color: b.color,
            };
            if b.x1 - b.x0 <= 2.0 * s || b.y1 - b.y0 <= 2.0 * s {
                rects.push(rect(b.x0, b.y0, b.x1.max(b.x0 + s), b.y1.max(b.y0 + s)));
                continue;
            }
            rects.push(rect(b.x0, b.y0, b.x1, b.y0 + s));
            rects.push(rect(b.x0, b.y1 - s, b.x1, b.y1));
            rects.push(rect(b.x0, b.y0 + s, b.x0 + s, b.y1 - s));
            rects.push(rect(b.x1 - s, b.y0 + s, b.x1, b.y1 - s));
        }
        rects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_box(side: f32) -> BoundingBox {
        BoundingBox::new(0.0, 0.0, side, side, BoxColor::DEFAULT)
    }

    fn settings() -> LodSettings {
        LodSettings {
            threshold_px: 150.0,
            max_boxes: 20,
        }
    }

    #[test]
    fn test_small_thumbnail_draws_largest_boxes() {
        let boxes: Vec<BoundingBox> = (0..150)
            .map(|i| square_box(((i * 37) % 150) as f32 / 150.0 + 0.001))
            .collect();

        let picked = select_boxes(&boxes, 80.0, settings());
        assert_eq!(picked.len(), 20);

        let smallest_picked = picked
            .iter()
            .map(|&i| boxes[i].area())
            .fold(f32::INFINITY, f32::min);
        let dropped_max = (0..150)
            .filter(|i| !picked.contains(i))
            .map(|i| boxes[i].area())
            .fold(0.0, f32::max);
        assert!(smallest_picked >= dropped_max);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_large_thumbnail_draws_everything() {
        let boxes: Vec<BoundingBox> = (0..150).map(|i| square_box(i as f32 / 150.0)).collect();
        assert_eq!(select_boxes(&boxes, 200.0, settings()).len(), 150);
        // At or below the cap nothing is dropped, whatever the width.
        assert_eq!(select_boxes(&boxes[..20], 10.0, settings()).len(), 20);
    }

    #[test]
    fn test_ties_keep_original_order() {
        let boxes = vec![square_box(0.5); 5];
        let lod = LodSettings {
            threshold_px: 150.0,
            max_boxes: 2,
        };
        assert_eq!(select_boxes(&boxes, 50.0, lod), vec![0, 1]);
    }

    #[test]
    fn test_stroke_width_clamped() {
        assert_eq!(stroke_width(40.0), 1.0);
        assert_eq!(stroke_width(250.0), 2.5);
        assert_eq!(stroke_width(800.0), 3.0);
        assert_eq!(stroke_width(f32::NAN), 1.0);
    }

    #[test]
    fn test_frame_maps_to_pixels() {
        let boxes = vec![BoundingBox::new(0.5, 0.9, 0.1, 0.2, BoxColor::DEFAULT)];
        let frame = OverlayFrame::build(&boxes, 200.0, 100.0, settings());
        assert!(!frame.reduced);
        assert_eq!(frame.stroke_width, 2.0);
        let b = frame.boxes[0];
        assert!((b.x0 - 20.0).abs() < 1e-4);
        assert!((b.x1 - 100.0).abs() < 1e-4);
        assert!((b.y0 - 20.0).abs() < 1e-4);
        assert!((b.y1 - 90.0).abs() < 1e-4);

        let rects = frame.outline_rects();
        assert_eq!(rects.len(), 4);
        assert_eq!((rects[0].y0, rects[0].y1), (b.y0, b.y0 + 2.0));
    }
}
