use crate::models::ImageId;

#[derive(Debug, Clone, PartialEq)]
pub struct RowItem {
    pub image_id: ImageId,
    /// Position of the image in the input list.
    pub image_index: usize,
    pub offset_x: f32,
    pub display_w: f32,
    pub display_h: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowModel {
    pub row_index: u32,
    pub height_px: f32,
    pub items: Vec<RowItem>,
    /// False only for a trailing row that never reached the container width.
    pub justified: bool,
}

impl RowModel {
    pub fn new(row_index: u32, height_px: f32, items: Vec<RowItem>, justified: bool) -> Self {
        Self {
            row_index,
            height_px,
            items,
            justified,
        }
    }

    /// Rendered width of the row: item widths plus inter-item spacing.
    pub fn content_width(&self, spacing: f32) -> f32 {
        let widths: f32 = self.items.iter().map(|item| item.display_w).sum();
        widths + spacing * self.items.len().saturating_sub(1) as f32
    }

    /// Returns the item whose horizontal extent contains `x`.
    pub fn item_at(&self, x: f32) -> Option<&RowItem> {
        self.items
            .iter()
            .find(|item| x >= item.offset_x && x < item.offset_x + item.display_w)
    }

    pub fn first_image_index(&self) -> Option<usize> {
        self.items.first().map(|item| item.image_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, offset_x: f32, w: f32) -> RowItem {
        RowItem {
            image_id: ImageId(index as u64),
            image_index: index,
            offset_x,
            display_w: w,
            display_h: 100.0,
        }
    }

    #[test]
    fn test_item_at_skips_gaps() {
        let row = RowModel::new(0, 100.0, vec![item(0, 0.0, 50.0), item(1, 60.0, 40.0)], true);
        assert_eq!(row.item_at(10.0).map(|i| i.image_index), Some(0));
        assert!(row.item_at(55.0).is_none());
        assert_eq!(row.item_at(99.0).map(|i| i.image_index), Some(1));
        assert!((row.content_width(10.0) - 100.0).abs() < 1e-6);
    }
}
