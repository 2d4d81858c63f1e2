//! Row windowing over variable-height rows.
//!
//! The virtualizer keeps a prefix-sum of row offsets and answers "which rows
//! intersect this viewport" with two binary searches. Offsets are only
//! rebuilt on the first read after an invalidation, never eagerly.

use std::collections::HashMap;
use std::ops::Range;

use tracing::trace;

use crate::models::RowModel;

/// Height assumed for rows with no estimate at all.
const PLACEHOLDER_ROW_HEIGHT: f32 = 200.0;

/// Measurements closer than this to the current estimate are ignored.
const MEASUREMENT_EPSILON: f32 = 0.5;

/// A row selected for rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualRow {
    pub index: usize,
    /// Top of the row in content coordinates.
    pub offset: f32,
    pub height: f32,
    /// Distance to the next row's top (height plus row gap). The last row's
    /// span runs to the end of the content.
    pub span: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VirtualWindow {
    pub rows: Vec<VirtualRow>,
    pub total_height: f32,
    /// Scroll offset after clamping to the scrollable range.
    pub scroll_offset: f32,
    pub viewport_height: f32,
}

impl VirtualWindow {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn range(&self) -> Range<usize> {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => first.index..last.index + 1,
            _ => 0..0,
        }
    }

    pub fn first_index(&self) -> Option<usize> {
        self.rows.first().map(|row| row.index)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.rows.last().map(|row| row.index)
    }

    /// Content interval covered by the window's rows, `[start, end)`.
    pub fn covered(&self) -> (f32, f32) {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => (first.offset, last.offset + last.span),
            _ => (0.0, 0.0),
        }
    }
}

pub struct Virtualizer {
    estimates: Vec<f32>,
    measured: HashMap<usize, f32>,
    row_gap: f32,
    overscan: usize,
    /// `offsets[i]` is the top of row `i`; `offsets[n]` is one gap past the end.
    offsets: Vec<f32>,
    dirty: bool,
    remeasure_requests: u64,
    measure_passes: u64,
}

impl Virtualizer {
    pub fn new(row_gap: f32, overscan: usize) -> Self {
        Self {
            estimates: Vec::new(),
            measured: HashMap::new(),
            row_gap: sanitize_gap(row_gap),
            overscan,
            offsets: vec![0.0],
            dirty: true,
            remeasure_requests: 0,
            measure_passes: 0,
        }
    }

    /// Replaces the row set. Measurements belong to the old rows and are
    /// dropped with them.
    pub fn set_rows(&mut self, rows: &[RowModel]) {
        self.estimates = rows.iter().map(|row| row.height_px).collect();
        self.measured.clear();
        self.dirty = true;
    }

    pub fn set_row_gap(&mut self, row_gap: f32) {
        let row_gap = sanitize_gap(row_gap);
        if row_gap != self.row_gap {
            self.row_gap = row_gap;
            self.dirty = true;
        }
    }

    pub fn set_overscan(&mut self, overscan: usize) {
        self.overscan = overscan;
    }

    pub fn row_count(&self) -> usize {
        self.estimates.len()
    }

    /// Invalidates cached offsets. They are rebuilt on the next read.
    pub fn remeasure(&mut self) {
        self.remeasure_requests += 1;
        self.dirty = true;
    }

    /// Stores the actual rendered height of a row. Takes effect at the next
    /// [`remeasure`](Self::remeasure). Returns whether the value differs from
    /// the current estimate.
    pub fn record_measurement(&mut self, row: usize, height: f32) -> bool {
        if row >= self.estimates.len() || !height.is_finite() || height <= 0.0 {
            return false;
        }
        let changed = (self.estimate_height(row) - height).abs() >= MEASUREMENT_EPSILON;
        if changed {
            self.measured.insert(row, height);
        }
        changed
    }

    /// Actual height once measured, else the packer's height, else a
    /// placeholder.
    pub fn estimate_height(&self, row: usize) -> f32 {
        self.measured
            .get(&row)
            .or_else(|| self.estimates.get(row))
            .copied()
            .filter(|h| h.is_finite() && *h > 0.0)
            .unwrap_or(PLACEHOLDER_ROW_HEIGHT)
    }

    fn ensure_offsets(&mut self) {
        let n = self.estimates.len();
        if !self.dirty && self.offsets.len() == n + 1 {
            return;
        }

        let mut offsets = Vec::with_capacity(n + 1);
        let mut acc = 0.0f32;
        offsets.push(acc);
        for row in 0..n {
            acc += self.estimate_height(row) + self.row_gap;
            offsets.push(acc);
        }
        self.offsets = offsets;
        self.dirty = false;
        self.measure_passes += 1;
        trace!(rows = n, total = self.total_height_unchecked(), "Row offsets rebuilt");
    }

    fn total_height_unchecked(&self) -> f32 {
        match self.offsets.last() {
            Some(end) if self.offsets.len() > 1 => end - self.row_gap,
            _ => 0.0,
        }
    }

    /// Sum of all row heights plus inter-row gaps.
    pub fn total_height(&mut self) -> f32 {
        self.ensure_offsets();
        self.total_height_unchecked()
    }

    /// Content offset of a row's top edge, for scroll-to-row.
    pub fn scroll_offset_for_row(&mut self, row: usize) -> Option<f32> {
        self.ensure_offsets();
        if row < self.estimates.len() {
            self.offsets.get(row).copied()
        } else {
            None
        }
    }

    /// Computes the contiguous rows covering the viewport plus overscan.
    pub fn window(&mut self, scroll_offset: f32, viewport_height: f32) -> VirtualWindow {
        self.ensure_offsets();
        let n = self.estimates.len();
        let total = self.total_height_unchecked();
        let viewport = if viewport_height.is_finite() {
            viewport_height.max(0.0)
        } else {
            0.0
        };
        let max_scroll = (total - viewport).max(0.0);
        let scroll = if scroll_offset.is_finite() {
            scroll_offset.clamp(0.0, max_scroll)
        } else {
            0.0
        };

        if n == 0 {
            return VirtualWindow {
                rows: Vec::new(),
                total_height: 0.0,
                scroll_offset: scroll,
                viewport_height: viewport,
            };
        }

        let avg_height = total / n as f32;
        let margin = self.overscan as f32 * avg_height;
        let start_px = (scroll - margin).max(0.0);
        let end_px = (scroll + viewport + margin).min(total);

        let tops = &self.offsets[..n];
        let first = tops.partition_point(|&top| top <= start_px).saturating_sub(1);
        let last = tops
            .partition_point(|&top| top < end_px)
            .saturating_sub(1)
            .max(first);

        let rows = (first..=last)
            .map(|index| {
                // From the offsets, so a measurement not yet applied by
                // `remeasure` cannot disagree with `offset` and `span`.
                let height = self.offsets[index + 1] - self.offsets[index] - self.row_gap;
                let span = if index + 1 == n {
                    total - self.offsets[index]
                } else {
                    self.offsets[index + 1] - self.offsets[index]
                };
                VirtualRow {
                    index,
                    offset: self.offsets[index],
                    height,
                    span,
                }
            })
            .collect();

        VirtualWindow {
            rows,
            total_height: total,
            scroll_offset: scroll,
            viewport_height: viewport,
        }
    }

    /// Number of explicit invalidations so far.
    pub fn remeasure_requests(&self) -> u64 {
        self.remeasure_requests
    }

    /// Number of times offsets were actually rebuilt.
    pub fn measure_passes(&self) -> u64 {
        self.measure_passes
    }
}

fn sanitize_gap(gap: f32) -> f32 {
    if gap.is_finite() {
        gap.max(0.0)
    } else {
        0.0
    }
}
