use crate::config::LayoutConfig;
use crate::models::{ImageRecord, RowItem, RowModel};

/// Configuration for the justified row packer.
///
/// Rows are filled greedily at the target height and, once full, scaled
/// uniformly so their width matches the container exactly. A trailing row
/// that never fills up keeps the target height and is left-justified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JustifiedLayout {
    /// Target row height in pixels (default: 200)
    pub target_height: f32,
    /// Gap between items in a row in pixels (default: 4)
    pub spacing: f32,
}

impl Default for JustifiedLayout {
    fn default() -> Self {
        let cfg = LayoutConfig::default();
        Self {
            target_height: cfg.target_row_height,
            spacing: cfg.spacing,
        }
    }
}

impl JustifiedLayout {
    pub fn new(target_height: f32, spacing: f32) -> Self {
        Self {
            target_height,
            spacing,
        }
    }

    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::new(config.target_row_height, config.spacing)
    }

    fn sanitized(&self, container_width: f32) -> LayoutConfig {
        LayoutConfig::new(container_width, self.target_height, self.spacing).sanitized()
    }

    /// Computes the justified rows for a list of images.
    ///
    /// # Algorithm
    /// 1. Accumulate `target_height * aspect_ratio` per image.
    /// 2. Once the accumulated width plus spacing reaches the container
    ///    width, close the row with scale
    ///    `s = (container_width - spacing * (k - 1)) / accumulated`.
    /// 3. Emit a trailing, unfilled row unscaled at the target height.
    ///
    /// # Arguments
    /// * `items` - Images in display order
    /// * `container_width` - The available width in pixels
    ///
    /// # Returns
    /// Rows with resolved height and per-image width. Empty when the
    /// container has no width yet.
    pub fn compute(&self, items: &[ImageRecord], container_width: f32) -> Vec<RowModel> {
        let breaks = self.compute_breaks(items, container_width);
        self.rows_from_breaks(items, &breaks)
    }

    /// Computes row breaks (indices) for caching purposes.
    ///
    /// This is the single O(n) packing pass; `compute` is built on it.
    pub fn compute_breaks(&self, items: &[ImageRecord], container_width: f32) -> Vec<RowBreak> {
        let cfg = self.sanitized(container_width);
        if items.is_empty() || cfg.container_width <= 0.0 {
            return Vec::new();
        }

        let width = cfg.container_width;
        let spacing = cfg.spacing;
        let target = cfg.target_row_height;

        let mut breaks = Vec::new();
        let mut start = 0usize;
        let mut accumulated = 0.0f32;

        for (idx, item) in items.iter().enumerate() {
            let pending = idx - start;
            if pending > 0 && spacing * pending as f32 >= width {
                // One more gap would leave no room for image content.
                breaks.push(Self::close_row(start, idx, accumulated, &cfg));
                start = idx;
                accumulated = 0.0;
            }

            accumulated += target * item.aspect_ratio();
            let gaps = (idx - start) as f32 * spacing;
            if accumulated + gaps >= width {
                breaks.push(Self::close_row(start, idx + 1, accumulated, &cfg));
                start = idx + 1;
                accumulated = 0.0;
            }
        }

        if start < items.len() {
            breaks.push(RowBreak {
                start_index: start,
                end_index: items.len(),
                row_height: target,
                justified: false,
            });
        }

        breaks
    }

    fn close_row(start: usize, end: usize, accumulated: f32, cfg: &LayoutConfig) -> RowBreak {
        let gaps = (end - start).saturating_sub(1) as f32 * cfg.spacing;
        let scale = (cfg.container_width - gaps) / accumulated;
        RowBreak {
            start_index: start,
            end_index: end,
            row_height: cfg.target_row_height * scale,
            justified: true,
        }
    }

    /// Reconstructs rows from cached breaks without re-running the packer.
    ///
    /// Every image in a row shares the row height, so its width is simply
    /// `aspect_ratio * row_height`.
    pub fn rows_from_breaks(&self, items: &[ImageRecord], breaks: &[RowBreak]) -> Vec<RowModel> {
        let spacing = self.sanitized(0.0).spacing;
        breaks
            .iter()
            .enumerate()
            .map(|(row_idx, brk)| {
                let mut offset_x = 0.0f32;
                let row_items: Vec<RowItem> = items[brk.start_index..brk.end_index]
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        if i > 0 {
                            offset_x += spacing;
                        }
                        let display_w = item.aspect_ratio() * brk.row_height;
                        let row_item = RowItem {
                            image_id: item.id,
                            image_index: brk.start_index + i,
                            offset_x,
                            display_w,
                            display_h: brk.row_height,
                        };
                        offset_x += display_w;
                        row_item
                    })
                    .collect();

                RowModel::new(row_idx as u32, brk.row_height, row_items, brk.justified)
            })
            .collect()
    }

    /// Calculates the total height of all rows.
    /// Useful for scroll calculations.
    pub fn total_height(&self, rows: &[RowModel], row_gap: f32) -> f32 {
        if rows.is_empty() {
            return 0.0;
        }

        let heights_sum: f32 = rows.iter().map(|r| r.height_px).sum();
        let gaps_sum = (rows.len().saturating_sub(1)) as f32 * row_gap;
        heights_sum + gaps_sum
    }
}

/// Packs `images` into justified rows. See [`JustifiedLayout::compute`].
pub fn pack(
    images: &[ImageRecord],
    container_width: f32,
    target_row_height: f32,
    spacing: f32,
) -> Vec<RowModel> {
    JustifiedLayout::new(target_row_height, spacing).compute(images, container_width)
}

/// Represents a row break for caching purposes.
/// Contains only the indices and height, not the actual items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowBreak {
    /// Start index in the items array (inclusive)
    pub start_index: usize,
    /// End index in the items array (exclusive)
    pub end_index: usize,
    /// The computed height for this row
    pub row_height: f32,
    /// Whether the row was scaled to the full container width
    pub justified: bool,
}
