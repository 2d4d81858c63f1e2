use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::layout::FrameScheduler;

type FrameCallback = Rc<dyn Fn()>;

/// Runs the engine's frame callback from a glib idle source, at most once
/// per batch of requests.
#[derive(Clone, Default)]
pub struct GlibFrameScheduler {
    pending: Rc<Cell<bool>>,
    callback: Rc<RefCell<Option<FrameCallback>>>,
}

impl GlibFrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the frame callback. Must happen before the main loop next
    /// iterates, or earlier requests are lost.
    pub fn set_callback(&self, callback: impl Fn() + 'static) {
        *self.callback.borrow_mut() = Some(Rc::new(callback));
    }
}

impl FrameScheduler for GlibFrameScheduler {
    fn request_frame(&self) {
        if self.pending.replace(true) {
            return;
        }
        let pending = Rc::clone(&self.pending);
        let callback = Rc::clone(&self.callback);
        glib::idle_add_local_once(move || {
            pending.set(false);
            let callback = callback.borrow().clone();
            if let Some(callback) = callback {
                callback();
            }
        });
    }
}
