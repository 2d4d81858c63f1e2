//! The windowed grid engine.
//!
//! `GridEngine` owns the image list and everything derived from it. Hosts
//! feed it container sizes, scroll offsets and zoom changes, pump
//! [`GridEngine::on_frame`] whenever their [`FrameScheduler`] fires, and
//! read back the visible window and its cells.
//!
//! Notifications never repack or remeasure inline. They only mark work
//! for the next frame, so reads in between observe the previous
//! consistent set of rows and offsets.

use tracing::{debug, info, trace};

use crate::config::{GridConfig, LodSettings, ZoomLevel};
use crate::feed::{PageReceiver, PageSource};
use crate::layout::{
    CachedLayoutComputer, FrameScheduler, JustifiedLayout, PaginationTrigger,
    RemeasureCoordinator, ResizeEffect, VirtualWindow, Virtualizer,
};
use crate::models::{ImageId, ImageRecord, RowModel};

/// One image placed in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleCell {
    pub row: usize,
    pub image_index: usize,
    pub image_id: ImageId,
    pub x: f32,
    /// Top of the row in content coordinates.
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

pub struct GridEngine {
    config: GridConfig,
    images: Vec<ImageRecord>,
    computer: CachedLayoutComputer,
    rows: Vec<RowModel>,
    virtualizer: Virtualizer,
    coordinator: RemeasureCoordinator,
    pagination: PaginationTrigger,
    source: Option<Box<dyn PageSource>>,
    pages: Option<PageReceiver>,
    scroll_offset: f32,
    window: VirtualWindow,
    mounted: bool,
    frames: u64,
}

impl GridEngine {
    pub fn new(config: GridConfig, scheduler: Box<dyn FrameScheduler>) -> Self {
        let layout = config.layout.sanitized();
        let config = GridConfig { layout, ..config };
        let mut coordinator = RemeasureCoordinator::new(scheduler);
        if layout.container_width > 0.0 {
            coordinator.observe_resize(layout.container_width, 0.0);
        }

        Self {
            computer: CachedLayoutComputer::with_layout(JustifiedLayout::from_config(&layout)),
            virtualizer: Virtualizer::new(layout.spacing, config.overscan_rows),
            config,
            images: Vec::new(),
            rows: Vec::new(),
            coordinator,
            pagination: PaginationTrigger::default(),
            source: None,
            pages: None,
            scroll_offset: 0.0,
            window: VirtualWindow::default(),
            mounted: true,
            frames: 0,
        }
    }

    /// Connects the paginated data source and the channel its pages arrive on.
    pub fn attach_source(&mut self, source: Box<dyn PageSource>, pages: PageReceiver) {
        self.source = Some(source);
        self.pages = Some(pages);
        self.pagination.reset();
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn lod_settings(&self) -> LodSettings {
        self.config.lod
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    /// Rows as of the last frame.
    pub fn rows(&self) -> &[RowModel] {
        &self.rows
    }

    pub fn visible_window(&self) -> &VirtualWindow {
        &self.window
    }

    pub fn total_height(&self) -> f32 {
        self.window.total_height
    }

    pub fn scroll_offset(&self) -> f32 {
        self.window.scroll_offset
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn has_pending_work(&self) -> bool {
        self.coordinator.has_pending()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn virtualizer(&self) -> &Virtualizer {
        &self.virtualizer
    }

    pub fn pagination(&self) -> &PaginationTrigger {
        &self.pagination
    }

    /// Container size from the host. A width change schedules a repack; a
    /// height change only moves the viewport.
    pub fn set_container_size(&mut self, width: f32, height: f32) -> ResizeEffect {
        let effect = self.coordinator.observe_resize(width, height);
        if effect == ResizeEffect::ViewportOnly {
            self.refresh_window();
        }
        effect
    }

    pub fn set_scroll_offset(&mut self, offset: f32) {
        self.scroll_offset = if offset.is_finite() { offset.max(0.0) } else { 0.0 };
        self.refresh_window();
    }

    /// Scrolls so that `row` sits at the top of the viewport.
    pub fn scroll_to_row(&mut self, row: usize) -> Option<f32> {
        let offset = self.virtualizer.scroll_offset_for_row(row)?;
        self.set_scroll_offset(offset);
        Some(self.window.scroll_offset)
    }

    pub fn set_zoom(&mut self, zoom: ZoomLevel) {
        self.set_layout(zoom.target_row_height(), self.config.layout.spacing);
    }

    /// Explicit target row height and spacing. Treated like a resize.
    pub fn set_layout(&mut self, target_row_height: f32, spacing: f32) {
        let mut layout = self.config.layout;
        layout.target_row_height = target_row_height;
        layout.spacing = spacing;
        let layout = layout.sanitized();
        if layout == self.config.layout {
            return;
        }
        debug!(
            target = layout.target_row_height,
            spacing = layout.spacing,
            "Layout settings changed"
        );
        self.config.layout = layout;
        self.coordinator.observe_layout_changed();
    }

    pub fn set_lod_settings(&mut self, lod: LodSettings) {
        self.config.lod = lod;
    }

    /// Appends a page of records. Returns false, dropping the page, once the
    /// engine has been unmounted.
    pub fn append_page(&mut self, page: Vec<ImageRecord>) -> bool {
        if !self.mounted {
            debug!(images = page.len(), "Discarding page for unmounted grid");
            return false;
        }
        if page.is_empty() {
            return true;
        }
        self.images.extend(page);
        self.coordinator.observe_rows_changed();
        true
    }

    /// Replaces the whole collection, e.g. when switching folders.
    pub fn set_images(&mut self, images: Vec<ImageRecord>) {
        if !self.mounted {
            return;
        }
        self.images = images;
        self.scroll_offset = 0.0;
        self.pagination.reset();
        self.coordinator.observe_rows_changed();
    }

    /// Reports the actual rendered height of a row.
    pub fn record_row_height(&mut self, row: usize, height: f32) {
        if self.virtualizer.record_measurement(row, height) {
            trace!(row, height, "Row measurement differs from estimate");
            self.coordinator.observe_measurement();
        }
    }

    /// Drains delivered pages between frames. Returns how many images were
    /// added.
    ///
    /// A wakeup with nothing to drain re-checks pagination against the
    /// current window, so a source whose flags settle after its page was
    /// merged is still asked for the next one.
    pub fn poll_pages(&mut self) -> usize {
        let added = self.drain_pages();
        if added > 0 {
            self.coordinator.observe_rows_changed();
        } else if self.mounted && !self.coordinator.has_pending() {
            self.maybe_paginate();
        }
        added
    }

    fn drain_pages(&mut self) -> usize {
        if !self.mounted {
            return 0;
        }
        let Some(pages) = &self.pages else {
            return 0;
        };
        let mut added = 0;
        for page in pages.drain() {
            added += page.len();
            self.images.extend(page);
        }
        if added > 0 {
            debug!(added, total = self.images.len(), "Merged delivered pages");
        }
        added
    }

    /// The host's frame callback. Applies every change coalesced since the
    /// previous frame: repack, then remeasure, then the new window.
    pub fn on_frame(&mut self) {
        if !self.mounted {
            return;
        }
        self.frames += 1;

        let merged = self.drain_pages() > 0;
        let mut work = self.coordinator.take_pending();
        work.repack |= merged;
        work.remeasure |= merged;

        if work.repack {
            self.repack();
        }
        if work.remeasure {
            self.virtualizer.remeasure();
        }
        self.refresh_window();
    }

    fn repack(&mut self) {
        let layout = self.config.layout;
        self.config.layout.container_width = self.coordinator.container_width();
        self.computer
            .set_layout(JustifiedLayout::from_config(&self.config.layout));
        self.virtualizer.set_row_gap(layout.spacing);
        self.virtualizer.set_overscan(self.config.overscan_rows);

        self.rows = self
            .computer
            .compute(&self.images, self.config.layout.container_width);
        self.virtualizer.set_rows(&self.rows);
        debug!(
            images = self.images.len(),
            rows = self.rows.len(),
            width = self.config.layout.container_width,
            "Repacked rows"
        );
    }

    fn refresh_window(&mut self) {
        if !self.mounted || self.coordinator.has_pending() {
            return;
        }
        self.window = self
            .virtualizer
            .window(self.scroll_offset, self.coordinator.viewport_height());
        self.maybe_paginate();
    }

    fn maybe_paginate(&mut self) {
        if self.coordinator.container_width() <= 0.0 {
            return;
        }
        let Some(source) = self.source.as_mut() else {
            return;
        };
        let fire = self.pagination.evaluate(
            self.window.last_index(),
            self.rows.len(),
            self.images.len(),
            source.state(),
        );
        if fire {
            info!(
                images = self.images.len(),
                rows = self.rows.len(),
                "Fetching next page"
            );
            source.fetch_next();
        }
    }

    /// Cells of every row in the current window.
    pub fn visible_cells(&self) -> Vec<VisibleCell> {
        self.window
            .rows
            .iter()
            .filter_map(|vrow| self.rows.get(vrow.index).map(|row| (vrow, row)))
            .flat_map(|(vrow, row)| {
                row.items.iter().map(move |item| VisibleCell {
                    row: vrow.index,
                    image_index: item.image_index,
                    image_id: item.image_id,
                    x: item.offset_x,
                    y: vrow.offset,
                    width: item.display_w,
                    height: item.display_h,
                })
            })
            .collect()
    }

    /// Cell under a content-space point.
    pub fn cell_at(&self, x: f32, y: f32) -> Option<VisibleCell> {
        let vrow = self
            .window
            .rows
            .iter()
            .find(|r| y >= r.offset && y < r.offset + r.height)?;
        let item = self.rows.get(vrow.index)?.item_at(x)?;
        Some(VisibleCell {
            row: vrow.index,
            image_index: item.image_index,
            image_id: item.image_id,
            x: item.offset_x,
            y: vrow.offset,
            width: item.display_w,
            height: item.display_h,
        })
    }

    /// Tears the grid down. Pages still in flight are discarded when they
    /// arrive.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.pages = None;
        self.source = None;
        self.window = VirtualWindow::default();
        info!(images = self.images.len(), "Grid unmounted");
    }
}

impl Drop for GridEngine {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::feed::{page_channel, FeedState, SyntheticFeed};
    use crate::layout::{ManualFrameScheduler, PaginationState};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn square(id: u64) -> ImageRecord {
        ImageRecord::new(ImageId(id), 100, 100)
    }

    fn engine(width: f32, target: f32, spacing: f32) -> (GridEngine, ManualFrameScheduler) {
        let scheduler = ManualFrameScheduler::new();
        let config = GridConfig {
            layout: LayoutConfig::new(width, target, spacing),
            ..GridConfig::default()
        };
        (
            GridEngine::new(config, Box::new(scheduler.clone())),
            scheduler,
        )
    }

    fn assert_rows_fill(rows: &[RowModel], width: f32, spacing: f32) {
        for row in rows {
            let first_h = row.items[0].display_h;
            for item in &row.items {
                assert!((item.display_h - first_h).abs() < 1e-3);
            }
            let content = row.content_width(spacing);
            if row.justified {
                assert!((content - width).abs() < 0.5, "row {} is {content}", row.row_index);
            } else {
                assert!(content <= width + 0.5);
            }
        }
    }

    #[test]
    fn test_notifications_never_remeasure_inline() {
        let (mut engine, scheduler) = engine(1000.0, 200.0, 4.0);
        engine.append_page((0..40).map(square).collect());
        engine.on_frame();
        let rows_before = engine.rows().len();
        let requests = engine.virtualizer().remeasure_requests();
        let passes = engine.virtualizer().measure_passes();
        let frames_requested = scheduler.requested();

        engine.set_container_size(500.0, 800.0);
        engine.set_zoom(ZoomLevel::Few);
        engine.append_page((40..50).map(square).collect());
        engine.record_row_height(0, 250.0);
        engine.set_scroll_offset(300.0);

        assert_eq!(engine.virtualizer().remeasure_requests(), requests);
        assert_eq!(engine.virtualizer().measure_passes(), passes);
        assert_eq!(engine.rows().len(), rows_before);
        assert!(engine.has_pending_work());
        // Every trigger coalesced into one frame request.
        assert_eq!(scheduler.requested(), frames_requested + 1);

        engine.on_frame();
        assert!(!engine.has_pending_work());
        assert_eq!(engine.virtualizer().remeasure_requests(), requests + 1);
        assert_eq!(engine.virtualizer().measure_passes(), passes + 1);
        assert_ne!(engine.rows().len(), rows_before);
    }

    #[test]
    fn test_resize_halving_width_adds_rows() {
        let (mut engine, _) = engine(1000.0, 200.0, 10.0);
        let images: Vec<ImageRecord> = (0..60)
            .map(|i| ImageRecord::new(ImageId(i), 100 + (i as u32 * 37) % 300, 150))
            .collect();
        engine.append_page(images);
        engine.set_container_size(1000.0, 600.0);
        engine.on_frame();
        let wide = engine.rows().len();
        assert_rows_fill(engine.rows(), 1000.0, 10.0);

        assert_eq!(engine.set_container_size(500.0, 600.0), ResizeEffect::Repack);
        engine.on_frame();
        assert!(engine.rows().len() > wide);
        assert_rows_fill(engine.rows(), 500.0, 10.0);

        let placed: usize = engine.rows().iter().map(|r| r.items.len()).sum();
        assert_eq!(placed, 60);
    }

    #[test]
    fn test_height_change_only_moves_viewport() {
        let (mut engine, scheduler) = engine(1000.0, 200.0, 0.0);
        engine.append_page((0..100).map(square).collect());
        engine.set_container_size(1000.0, 400.0);
        engine.on_frame();
        let requested = scheduler.requested();
        let passes = engine.virtualizer().measure_passes();
        let small = engine.visible_window().rows.len();

        assert_eq!(
            engine.set_container_size(1000.0, 1600.0),
            ResizeEffect::ViewportOnly
        );
        assert_eq!(scheduler.requested(), requested);
        assert_eq!(engine.virtualizer().measure_passes(), passes);
        assert!(engine.visible_window().rows.len() > small);
    }

    #[test]
    fn test_window_and_cells_follow_scroll() {
        let (mut engine, _) = engine(1000.0, 200.0, 0.0);
        // 5 squares per row, 40 rows of 200px.
        engine.append_page((0..200).map(square).collect());
        engine.set_container_size(1000.0, 600.0);
        engine.on_frame();
        assert_eq!(engine.rows().len(), 40);
        assert!((engine.total_height() - 8000.0).abs() < 1e-2);

        engine.set_scroll_offset(4000.0);
        let window = engine.visible_window();
        let (start, end) = window.covered();
        assert!(start <= 4000.0 - 3.0 * 200.0);
        assert!(end >= 4600.0 + 3.0 * 200.0);

        let cells = engine.visible_cells();
        assert_eq!(cells.len(), window.rows.len() * 5);
        assert!(cells.iter().all(|c| (c.width - 200.0).abs() < 1e-3));

        let hit = engine.cell_at(450.0, 4010.0).unwrap();
        assert_eq!(hit.row, 20);
        assert_eq!(hit.image_index, 102);

        assert_eq!(engine.scroll_to_row(10), Some(2000.0));
    }

    #[test]
    fn test_pagination_fires_once_per_crossing() {
        let (tx, rx) = page_channel();
        let feed = Rc::new(RefCell::new(SyntheticFeed::new(100, 20, tx).unwrap()));
        let (mut engine, _) = engine(1000.0, 200.0, 4.0);
        engine.attach_source(Box::new(Rc::clone(&feed)), rx);
        engine.set_container_size(1000.0, 800.0);

        // No rows yet counts as being at the end.
        engine.on_frame();
        assert_eq!(feed.borrow().requests(), 1);

        for offset in [0.0, 50.0, 100.0, 10.0] {
            engine.set_scroll_offset(offset);
        }
        engine.on_frame();
        assert_eq!(feed.borrow().requests(), 1);

        feed.borrow_mut().complete_pending();
        engine.on_frame();
        assert_eq!(engine.images().len(), 20);
        // Still near the end with fresh items: the next page is requested.
        assert_eq!(feed.borrow().requests(), 2);
        engine.set_scroll_offset(0.0);
        assert_eq!(feed.borrow().requests(), 2);
    }

    /// Source whose flags the test settles independently of page delivery.
    struct LateFlagSource {
        state: FeedState,
        requests: Rc<RefCell<u64>>,
    }

    impl PageSource for LateFlagSource {
        fn state(&self) -> PaginationState {
            self.state.snapshot()
        }

        fn fetch_next(&mut self) {
            if self.state.begin_fetch() {
                *self.requests.borrow_mut() += 1;
            }
        }
    }

    #[test]
    fn test_page_merged_while_source_still_fetching() {
        let (tx, rx) = page_channel();
        let state = FeedState::default();
        let requests = Rc::new(RefCell::new(0));
        let source = LateFlagSource {
            state: state.clone(),
            requests: Rc::clone(&requests),
        };
        let (mut engine, scheduler) = engine(1000.0, 200.0, 4.0);
        engine.attach_source(Box::new(source), rx);
        engine.set_container_size(1000.0, 800.0);
        engine.on_frame();
        assert_eq!(*requests.borrow(), 1);

        // Ten squares make two rows, shorter than the viewport.
        tx.send((0..10).map(square).collect());
        assert_eq!(engine.poll_pages(), 10);
        engine.on_frame();
        assert_eq!(engine.images().len(), 10);
        assert!(engine.total_height() < 800.0);
        assert_eq!(*requests.borrow(), 1);

        state.finish_fetch(true);
        let frames = scheduler.requested();
        for _ in 0..10 {
            engine.set_container_size(1000.0, 800.0);
        }
        assert_eq!(scheduler.requested(), frames);

        // The host's next wakeup finds no page but an idle source.
        assert_eq!(engine.poll_pages(), 0);
        assert_eq!(*requests.borrow(), 2);
        assert_eq!(engine.poll_pages(), 0);
        assert_eq!(*requests.borrow(), 2);
    }

    #[test]
    fn test_next_page_requested_when_content_is_shorter_than_viewport() {
        let (tx, rx) = page_channel();
        let feed = Rc::new(RefCell::new(SyntheticFeed::new(100, 5, tx).unwrap()));
        let (mut engine, _) = engine(1000.0, 200.0, 4.0);
        engine.attach_source(Box::new(Rc::clone(&feed)), rx);
        engine.set_container_size(1000.0, 800.0);
        engine.on_frame();

        for expected in 2..=4 {
            feed.borrow_mut().complete_pending();
            assert!(engine.poll_pages() > 0);
            engine.on_frame();
            assert_eq!(feed.borrow().requests(), expected);
        }
    }

    #[test]
    fn test_pagination_waits_for_width() {
        let (tx, rx) = page_channel();
        let feed = Rc::new(RefCell::new(SyntheticFeed::new(100, 20, tx).unwrap()));
        let (mut engine, _) = engine(0.0, 200.0, 4.0);
        engine.attach_source(Box::new(Rc::clone(&feed)), rx);
        engine.on_frame();
        assert_eq!(feed.borrow().requests(), 0);

        engine.set_container_size(800.0, 600.0);
        engine.on_frame();
        assert_eq!(feed.borrow().requests(), 1);
    }

    #[test]
    fn test_pages_after_unmount_are_discarded() {
        let (tx, rx) = page_channel();
        let feed = Rc::new(RefCell::new(SyntheticFeed::new(100, 20, tx).unwrap()));
        let (mut engine, _) = engine(1000.0, 200.0, 4.0);
        engine.attach_source(Box::new(Rc::clone(&feed)), rx);
        engine.on_frame();
        assert!(feed.borrow().has_pending());

        engine.unmount();
        feed.borrow_mut().complete_pending();
        engine.on_frame();
        assert!(engine.images().is_empty());
        assert!(!engine.append_page(vec![square(1)]));
        assert!(engine.images().is_empty());
    }

    #[test]
    fn test_zoom_reuses_cached_layout() {
        let (mut engine, _) = engine(1200.0, 200.0, 4.0);
        engine.append_page((0..30).map(square).collect());
        engine.on_frame();
        let medium = engine.rows().to_vec();

        engine.set_zoom(ZoomLevel::Many);
        engine.on_frame();
        assert!(engine.rows().len() < medium.len());

        engine.set_zoom(ZoomLevel::Medium);
        engine.on_frame();
        assert_eq!(engine.rows(), medium.as_slice());
    }

    #[test]
    fn test_measurement_shifts_following_rows() {
        let (mut engine, _) = engine(1000.0, 200.0, 0.0);
        engine.append_page((0..50).map(square).collect());
        engine.set_container_size(1000.0, 600.0);
        engine.on_frame();
        let before = engine.total_height();

        engine.record_row_height(0, 260.0);
        assert_eq!(engine.total_height(), before);
        engine.on_frame();
        assert!((engine.total_height() - (before + 60.0)).abs() < 1e-2);
        assert!((engine.visible_window().rows[1].offset - 260.0).abs() < 1e-3);
    }
}
