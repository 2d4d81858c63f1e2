//! Deferred relayout scheduling.
//!
//! Every layout input change only sets a dirty flag and asks the host for a
//! frame. The host calls back on its next frame, where the accumulated work
//! is taken in one piece: repacking and remeasuring never run inside the
//! call that reported the change.

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

/// Width changes smaller than this are treated as layout jitter.
const WIDTH_EPSILON: f32 = 0.5;

/// Host hook for "run the engine's frame callback soon".
///
/// Implementations must never invoke the callback synchronously from
/// `request_frame`.
pub trait FrameScheduler {
    fn request_frame(&self);
}

/// Scheduler for hosts that pump frames themselves (headless runs, tests).
#[derive(Debug, Clone, Default)]
pub struct ManualFrameScheduler {
    requests: Rc<Cell<u64>>,
}

impl ManualFrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames requested so far.
    pub fn requested(&self) -> u64 {
        self.requests.get()
    }
}

impl FrameScheduler for ManualFrameScheduler {
    fn request_frame(&self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// Work accumulated since the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingWork {
    pub repack: bool,
    pub remeasure: bool,
}

impl PendingWork {
    pub fn is_empty(&self) -> bool {
        !self.repack && !self.remeasure
    }
}

/// What a container size observation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEffect {
    Unchanged,
    /// Only the viewport height moved; rows stay as they are.
    ViewportOnly,
    /// The width moved; rows must be repacked.
    Repack,
}

pub struct RemeasureCoordinator {
    scheduler: Box<dyn FrameScheduler>,
    pending: PendingWork,
    frame_requested: bool,
    container_width: f32,
    viewport_height: f32,
}

impl RemeasureCoordinator {
    pub fn new(scheduler: Box<dyn FrameScheduler>) -> Self {
        Self {
            scheduler,
            pending: PendingWork::default(),
            frame_requested: false,
            container_width: 0.0,
            viewport_height: 0.0,
        }
    }

    pub fn container_width(&self) -> f32 {
        self.container_width
    }

    pub fn viewport_height(&self) -> f32 {
        self.viewport_height
    }

    /// Records a container size observation.
    pub fn observe_resize(&mut self, width: f32, height: f32) -> ResizeEffect {
        let width = if width.is_finite() { width.max(0.0) } else { 0.0 };
        let height = if height.is_finite() { height.max(0.0) } else { 0.0 };

        let width_changed = (width - self.container_width).abs() >= WIDTH_EPSILON;
        let height_changed = height != self.viewport_height;
        self.viewport_height = height;

        if width_changed {
            trace!(from = self.container_width, to = width, "Container width changed");
            self.container_width = width;
            self.mark(true);
            ResizeEffect::Repack
        } else if height_changed {
            ResizeEffect::ViewportOnly
        } else {
            ResizeEffect::Unchanged
        }
    }

    /// A new page arrived or the image list otherwise changed identity.
    pub fn observe_rows_changed(&mut self) {
        self.mark(true);
    }

    /// Target row height or spacing changed (zoom/density control).
    pub fn observe_layout_changed(&mut self) {
        self.mark(true);
    }

    /// A row reported a rendered height different from its estimate.
    pub fn observe_measurement(&mut self) {
        self.mark(false);
    }

    fn mark(&mut self, repack: bool) {
        self.pending.repack |= repack;
        self.pending.remeasure = true;
        if !self.frame_requested {
            self.frame_requested = true;
            self.scheduler.request_frame();
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> PendingWork {
        self.pending
    }

    /// Called from the host's frame callback. Returns and clears all work
    /// coalesced since the previous frame.
    pub fn take_pending(&mut self) -> PendingWork {
        self.frame_requested = false;
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> (RemeasureCoordinator, ManualFrameScheduler) {
        let scheduler = ManualFrameScheduler::new();
        (
            RemeasureCoordinator::new(Box::new(scheduler.clone())),
            scheduler,
        )
    }

    #[test]
    fn test_changes_coalesce_into_one_frame() {
        let (mut coord, scheduler) = coordinator();

        assert_eq!(coord.observe_resize(1000.0, 800.0), ResizeEffect::Repack);
        coord.observe_rows_changed();
        coord.observe_layout_changed();
        coord.observe_measurement();

        assert_eq!(scheduler.requested(), 1);
        let work = coord.take_pending();
        assert!(work.repack && work.remeasure);
        assert!(!coord.has_pending());

        coord.observe_measurement();
        assert_eq!(scheduler.requested(), 2);
        assert_eq!(
            coord.take_pending(),
            PendingWork {
                repack: false,
                remeasure: true
            }
        );
    }

    #[test]
    fn test_height_change_does_not_repack() {
        let (mut coord, scheduler) = coordinator();
        coord.observe_resize(1000.0, 800.0);
        coord.take_pending();

        assert_eq!(coord.observe_resize(1000.0, 600.0), ResizeEffect::ViewportOnly);
        assert_eq!(coord.viewport_height(), 600.0);
        assert!(!coord.has_pending());
        assert_eq!(scheduler.requested(), 1);

        assert_eq!(coord.observe_resize(1000.0, 600.0), ResizeEffect::Unchanged);
    }

    #[test]
    fn test_subpixel_width_jitter_is_ignored() {
        let (mut coord, scheduler) = coordinator();
        coord.observe_resize(1000.0, 800.0);
        coord.take_pending();

        assert_eq!(coord.observe_resize(1000.3, 800.0), ResizeEffect::Unchanged);
        assert_eq!(coord.container_width(), 1000.0);
        assert_eq!(scheduler.requested(), 1);
    }

    #[test]
    fn test_invalid_sizes_collapse_to_zero() {
        let (mut coord, _) = coordinator();
        coord.observe_resize(1000.0, 800.0);
        assert_eq!(coord.observe_resize(f32::NAN, -3.0), ResizeEffect::Repack);
        assert_eq!(coord.container_width(), 0.0);
        assert_eq!(coord.viewport_height(), 0.0);
    }
}
