//! Paginated image sources.
//!
//! The engine talks to a source through two narrow seams:
//! - [`PageSource`] - read the pagination flags, ask for the next page
//! - [`PageReceiver`] - pages arriving asynchronously, drained on the UI thread
//!
//! Sources own their flags. A page sent after the receiving grid was torn
//! down is dropped by the channel.

pub mod channel;
pub mod directory;
pub mod synthetic;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::layout::PaginationState;

pub use channel::{page_channel, page_channel_with_waker, PageReceiver, PageSender, Waker};
pub use directory::DirectoryFeed;
pub use synthetic::SyntheticFeed;

/// External data source supplying pages of images.
pub trait PageSource {
    fn state(&self) -> PaginationState;

    /// Starts fetching the next page. Completion is delivered through the
    /// source's [`PageSender`].
    fn fetch_next(&mut self);
}

/// Lets a host keep its own handle on a source it gave to the engine.
impl<T: PageSource + ?Sized> PageSource for Rc<RefCell<T>> {
    fn state(&self) -> PaginationState {
        self.borrow().state()
    }

    fn fetch_next(&mut self) {
        self.borrow_mut().fetch_next();
    }
}

#[derive(Debug)]
struct FeedFlags {
    has_more: AtomicBool,
    is_fetching: AtomicBool,
}

/// Pagination flags shared between a source and its fetch tasks.
#[derive(Debug, Clone)]
pub struct FeedState {
    flags: Arc<FeedFlags>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            flags: Arc::new(FeedFlags {
                has_more: AtomicBool::new(true),
                is_fetching: AtomicBool::new(false),
            }),
        }
    }
}

impl FeedState {
    pub fn snapshot(&self) -> PaginationState {
        PaginationState {
            has_more: self.flags.has_more.load(Ordering::Acquire),
            is_fetching: self.flags.is_fetching.load(Ordering::Acquire),
        }
    }

    /// Claims the fetch slot. Returns false when a fetch is already running
    /// or nothing is left to fetch.
    pub fn begin_fetch(&self) -> bool {
        if !self.flags.has_more.load(Ordering::Acquire) {
            return false;
        }
        self.flags
            .is_fetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish_fetch(&self, has_more: bool) {
        self.flags.has_more.store(has_more, Ordering::Release);
        self.flags.is_fetching.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_slot_is_exclusive() {
        let state = FeedState::default();
        assert!(state.begin_fetch());
        assert!(!state.begin_fetch());
        assert!(state.snapshot().is_fetching);

        state.finish_fetch(true);
        assert!(state.begin_fetch());
        state.finish_fetch(false);

        assert!(!state.begin_fetch());
        assert_eq!(
            state.snapshot(),
            PaginationState {
                has_more: false,
                is_fetching: false
            }
        );
    }
}
