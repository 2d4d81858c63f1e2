//! Deterministic in-memory feed used by the benchmark and tests.

use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::FeedError;
use crate::feed::{FeedState, PageSender, PageSource};
use crate::layout::PaginationState;
use crate::models::{BoundingBox, BoxColor, ImageId, ImagePayload, ImageRecord};

/// Aspect ratios the generator cycles through, roughly what a photo
/// collection contains.
const ASPECTS: [(u32, u32); 7] = [
    (4000, 3000),
    (3000, 4000),
    (1920, 1080),
    (1080, 1920),
    (2000, 2000),
    (6000, 1500),
    (3000, 2000),
];

const PALETTE: [&str; 4] = ["#ff3b30", "#34c759", "#0a84ff", "#ffd60a"];

/// Generates pages of pseudo-random images.
///
/// Fetches are held until [`SyntheticFeed::complete_pending`] is called so
/// callers can observe the in-flight state.
pub struct SyntheticFeed {
    total: usize,
    page_size: usize,
    boxes_per_image: usize,
    seed: u64,
    next_index: usize,
    pending: bool,
    requests: u64,
    state: FeedState,
    sender: PageSender,
}

impl SyntheticFeed {
    pub fn new(total: usize, page_size: usize, sender: PageSender) -> Result<Self, FeedError> {
        if page_size == 0 {
            return Err(FeedError::EmptyPage);
        }
        let state = FeedState::default();
        state.finish_fetch(total > 0);
        Ok(Self {
            total,
            page_size,
            boxes_per_image: 0,
            seed: 0x5eed,
            next_index: 0,
            pending: false,
            requests: 0,
            state,
            sender,
        })
    }

    pub fn with_boxes(mut self, boxes_per_image: usize) -> Self {
        self.boxes_per_image = boxes_per_image;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of times `fetch_next` started a fetch.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn delivered(&self) -> usize {
        self.next_index
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Resolves the in-flight fetch, if any, by sending its page.
    /// Returns the number of images delivered.
    pub fn complete_pending(&mut self) -> usize {
        if !self.pending {
            return 0;
        }
        self.pending = false;

        let end = (self.next_index + self.page_size).min(self.total);
        let page: Vec<ImageRecord> = (self.next_index..end).map(|i| self.image(i)).collect();
        let count = page.len();
        self.next_index = end;

        self.state.finish_fetch(self.next_index < self.total);
        self.sender.send(page);
        debug!(count, delivered = self.next_index, total = self.total, "Synthetic page ready");
        count
    }

    /// Builds image `index`. Same seed and index always give the same record.
    pub fn image(&self, index: usize) -> ImageRecord {
        let hash = self.hash(index as u64, 0);
        let (w, h) = ASPECTS[(hash % ASPECTS.len() as u64) as usize];
        let boxes = (0..self.boxes_per_image)
            .map(|b| self.bounding_box(index, b))
            .collect();
        ImageRecord::new(ImageId(index as u64), w, h).with_payload(ImagePayload {
            boxes,
            tags: Vec::new(),
        })
    }

    fn bounding_box(&self, index: usize, b: usize) -> BoundingBox {
        let salt = (b as u64 + 1) << 8;
        let unit = |k: u64| (self.hash(index as u64, salt | k) % 1000) as f32 / 1000.0;
        let (x, y) = (unit(1), unit(2));
        let (w, h) = (unit(3) * 0.5, unit(4) * 0.5);
        let color = BoxColor::from_hex(PALETTE[b % PALETTE.len()]).unwrap_or_default();
        BoundingBox::new(x, y, (x + w).min(1.0), (y + h).min(1.0), color)
    }

    fn hash(&self, index: u64, salt: u64) -> u64 {
        let mut buf = [0u8; 24];
        buf[..8].copy_from_slice(&self.seed.to_le_bytes());
        buf[8..16].copy_from_slice(&index.to_le_bytes());
        buf[16..].copy_from_slice(&salt.to_le_bytes());
        xxh3_64(&buf)
    }
}

impl PageSource for SyntheticFeed {
    fn state(&self) -> PaginationState {
        self.state.snapshot()
    }

    fn fetch_next(&mut self) {
        if !self.state.begin_fetch() {
            trace!("fetch_next ignored, feed busy or exhausted");
            return;
        }
        self.requests += 1;
        self.pending = true;
    }
}
