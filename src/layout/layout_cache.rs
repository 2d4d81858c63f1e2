use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

use crate::layout::justified::{JustifiedLayout, RowBreak};
use crate::models::{ImageRecord, RowModel};

/// Maximum number of cached layouts to keep in memory.
const MAX_CACHE_ENTRIES: usize = 8;

/// Key for the layout cache.
///
/// Layout inputs are keyed by their exact bit patterns: rows must match the
/// container width exactly, so widths are never bucketed.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct CacheKey {
    width_bits: u32,
    target_bits: u32,
    spacing_bits: u32,
    list_hash: u64,
}

impl CacheKey {
    fn new(layout: &JustifiedLayout, container_width: f32, list_hash: u64) -> Self {
        Self {
            width_bits: container_width.to_bits(),
            target_bits: layout.target_height.to_bits(),
            spacing_bits: layout.spacing.to_bits(),
            list_hash,
        }
    }
}

/// Cached layout data: the row breaks that can reconstruct the full layout.
#[derive(Debug, Clone)]
struct CachedLayout {
    breaks: Vec<RowBreak>,
    /// Number of items this layout was computed for
    item_count: usize,
}

/// Layout cache for storing and retrieving row breaks.
///
/// Packing is a pure function of `(images, width, target height, spacing)`,
/// so a hit yields exactly the rows a fresh pass would. The list hash covers
/// `(id, width, height)` of every image in order; appending a page changes it.
pub struct LayoutCache {
    cache: Mutex<LruCache<CacheKey, CachedLayout>>,
}

impl LayoutCache {
    /// Creates a new empty layout cache.
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHE_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Computes a fast hash of the image list.
    pub fn compute_list_hash(items: &[ImageRecord]) -> u64 {
        let mut hasher_input = Vec::with_capacity(items.len() * 16);

        for item in items {
            hasher_input.extend_from_slice(&item.id.0.to_le_bytes());
            hasher_input.extend_from_slice(&item.width.to_le_bytes());
            hasher_input.extend_from_slice(&item.height.to_le_bytes());
        }

        xxh3_64(&hasher_input)
    }

    /// Attempts to retrieve cached rows, reconstructing them from breaks.
    /// Returns None on cache miss.
    pub fn get(
        &self,
        layout: &JustifiedLayout,
        container_width: f32,
        list_hash: u64,
        items: &[ImageRecord],
    ) -> Option<Vec<RowModel>> {
        let key = CacheKey::new(layout, container_width, list_hash);

        let breaks = {
            let mut cache = self.cache.lock();
            let entry = cache.get(&key)?;
            if entry.item_count != items.len() {
                return None;
            }
            entry.breaks.clone()
        };

        Some(layout.rows_from_breaks(items, &breaks))
    }

    /// Stores row breaks in the cache, evicting the least recently used entry
    /// when full.
    pub fn set(
        &self,
        layout: &JustifiedLayout,
        container_width: f32,
        list_hash: u64,
        breaks: Vec<RowBreak>,
        item_count: usize,
    ) {
        let key = CacheKey::new(layout, container_width, list_hash);
        self.cache.lock().put(key, CachedLayout { breaks, item_count });
    }

    /// Clears the entire cache.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Returns the number of cached layouts.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Combines the packer with the cache. This is what the engine repacks with.
pub struct CachedLayoutComputer {
    pub layout: JustifiedLayout,
    pub cache: LayoutCache,
}

impl CachedLayoutComputer {
    pub fn with_layout(layout: JustifiedLayout) -> Self {
        Self {
            layout,
            cache: LayoutCache::new(),
        }
    }

    /// Switches target height / spacing. Cached entries for other settings
    /// stay valid since the key includes both.
    pub fn set_layout(&mut self, layout: JustifiedLayout) {
        self.layout = layout;
    }

    /// Computes the layout, using cached results if available.
    ///
    /// This method is O(rows) on cache hit and O(n) on cache miss.
    pub fn compute(&self, items: &[ImageRecord], container_width: f32) -> Vec<RowModel> {
        if items.is_empty() || container_width.is_nan() || container_width <= 0.0 {
            return Vec::new();
        }

        let list_hash = LayoutCache::compute_list_hash(items);

        if let Some(rows) = self.cache.get(&self.layout, container_width, list_hash, items) {
            trace!(rows = rows.len(), container_width, "Layout cache hit");
            return rows;
        }

        let breaks = self.layout.compute_breaks(items, container_width);
        let rows = self.layout.rows_from_breaks(items, &breaks);
        self.cache
            .set(&self.layout, container_width, list_hash, breaks, items.len());

        rows
    }

    /// Invalidates the cache, forcing recomputation on next call.
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

impl Default for CachedLayoutComputer {
    fn default() -> Self {
        Self::with_layout(JustifiedLayout::default())
    }
}
