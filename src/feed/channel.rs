use std::fmt;
use std::sync::Arc;

use flume::{Receiver, Sender, TryRecvError};
use tracing::debug;

use crate::models::ImageRecord;

/// Called after each delivered page, from the delivering thread.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Sending half, held by fetch tasks.
#[derive(Clone)]
pub struct PageSender {
    tx: Sender<Vec<ImageRecord>>,
    waker: Option<Waker>,
}

impl fmt::Debug for PageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSender")
            .field("has_waker", &self.waker.is_some())
            .finish_non_exhaustive()
    }
}

/// Receiving half, held by the grid engine and drained on the UI thread.
#[derive(Debug)]
pub struct PageReceiver {
    rx: Receiver<Vec<ImageRecord>>,
}

pub fn page_channel() -> (PageSender, PageReceiver) {
    let (tx, rx) = flume::unbounded();
    (PageSender { tx, waker: None }, PageReceiver { rx })
}

/// Like [`page_channel`], but pokes `waker` after every delivery so hosts
/// with their own main loop know when to drain.
pub fn page_channel_with_waker(waker: Waker) -> (PageSender, PageReceiver) {
    let (tx, rx) = flume::unbounded();
    (
        PageSender {
            tx,
            waker: Some(waker),
        },
        PageReceiver { rx },
    )
}

impl PageSender {
    /// Delivers a page. Returns false when the receiving grid is gone, in
    /// which case the page is discarded.
    pub fn send(&self, page: Vec<ImageRecord>) -> bool {
        let len = page.len();
        match self.tx.send(page) {
            Ok(()) => {
                if let Some(waker) = &self.waker {
                    waker();
                }
                true
            }
            Err(_) => {
                debug!(images = len, "Receiver gone, discarding stale page");
                false
            }
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.tx.is_disconnected()
    }
}

impl PageReceiver {
    /// Takes every page that has arrived, in arrival order, without blocking.
    pub fn drain(&self) -> Vec<Vec<ImageRecord>> {
        let mut pages = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(page) => pages.push(page),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        pages
    }

    /// Waits for the next page. None once every sender is gone.
    pub async fn recv(&self) -> Option<Vec<ImageRecord>> {
        self.rx.recv_async().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageId;

    #[test]
    fn test_pages_drain_in_order() {
        let (tx, rx) = page_channel();
        assert!(tx.send(vec![ImageRecord::new(ImageId(1), 10, 10)]));
        assert!(tx.send(vec![ImageRecord::new(ImageId(2), 10, 10)]));

        let pages = rx.drain();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0][0].id, ImageId(1));
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_waker_runs_per_delivered_page() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let woken = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&woken);
        let (tx, rx) = page_channel_with_waker(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        tx.send(Vec::new());
        tx.send(Vec::new());
        assert_eq!(woken.load(Ordering::SeqCst), 2);

        drop(rx);
        tx.send(Vec::new());
        assert_eq!(woken.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_discarded() {
        let (tx, rx) = page_channel();
        drop(rx);
        assert!(tx.is_disconnected());
        assert!(!tx.send(vec![ImageRecord::new(ImageId(1), 10, 10)]));
    }
}
