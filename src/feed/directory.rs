//! Feed that pages through the images of a local directory.
//!
//! Discovery and header reads run on tokio's blocking pool. The directory
//! is walked once, on the first fetch, and sorted by path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageReader;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::FeedError;
use crate::feed::{FeedState, PageSender, PageSource};
use crate::layout::PaginationState;
use crate::models::{ImageId, ImageRecord};

/// Returns true when the extension belongs to a decodable image format.
pub fn is_image_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" | "tiff" | "tif"
    )
}

#[derive(Debug, Default)]
struct Cursor {
    paths: Option<Vec<PathBuf>>,
    next: usize,
}

pub struct DirectoryFeed {
    root: PathBuf,
    page_size: usize,
    recursive: bool,
    runtime: Handle,
    cursor: Arc<Mutex<Cursor>>,
    state: FeedState,
    sender: PageSender,
}

impl DirectoryFeed {
    pub fn new(
        root: impl Into<PathBuf>,
        page_size: usize,
        runtime: Handle,
        sender: PageSender,
    ) -> Result<Self, FeedError> {
        let root = root.into();
        if !root.exists() {
            return Err(FeedError::MissingDirectory(root));
        }
        if !root.is_dir() {
            return Err(FeedError::NotADirectory(root));
        }
        if page_size == 0 {
            return Err(FeedError::EmptyPage);
        }
        Ok(Self {
            root,
            page_size,
            recursive: true,
            runtime,
            cursor: Arc::new(Mutex::new(Cursor::default())),
            state: FeedState::default(),
            sender,
        })
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn discover(root: &Path, recursive: bool) -> Vec<PathBuf> {
        let mut walker = WalkDir::new(root);
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut paths: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(is_image_extension)
            })
            .collect();
        paths.sort();
        info!("Discovered {} images under {:?}", paths.len(), root);
        paths
    }

    /// Reads the header only. Unreadable files get 0x0 and still take
    /// their slot in the grid.
    fn read_record(path: &Path) -> ImageRecord {
        let id = ImageId(xxh3_64(path.as_os_str().as_encoded_bytes()));
        let (width, height) = match ImageReader::open(path).and_then(|r| r.with_guessed_format())
        {
            Ok(reader) => reader.into_dimensions().unwrap_or_else(|e| {
                warn!("Failed to read image dimensions for {:?}: {}", path, e);
                (0, 0)
            }),
            Err(e) => {
                warn!("Failed to open image {:?}: {}", path, e);
                (0, 0)
            }
        };
        trace!("Got dimensions {}x{} for {:?}", width, height, path);
        ImageRecord::new(id, width, height)
    }

    fn fetch_page(
        root: &Path,
        recursive: bool,
        page_size: usize,
        cursor: &Mutex<Cursor>,
    ) -> (Vec<ImageRecord>, bool) {
        let mut guard = cursor.lock();
        let cursor = &mut *guard;
        let paths = cursor
            .paths
            .get_or_insert_with(|| Self::discover(root, recursive));
        let start = cursor.next.min(paths.len());
        let end = (start + page_size).min(paths.len());
        let page: Vec<ImageRecord> = paths[start..end].iter().map(|p| Self::read_record(p)).collect();
        let has_more = end < paths.len();
        cursor.next = end;
        (page, has_more)
    }
}

impl PageSource for DirectoryFeed {
    fn state(&self) -> PaginationState {
        self.state.snapshot()
    }

    fn fetch_next(&mut self) {
        if !self.state.begin_fetch() {
            trace!("fetch_next ignored, feed busy or exhausted");
            return;
        }

        let root = self.root.clone();
        let recursive = self.recursive;
        let page_size = self.page_size;
        let cursor = Arc::clone(&self.cursor);
        let state = self.state.clone();
        let sender = self.sender.clone();

        self.runtime.spawn(async move {
            let joined = task::spawn_blocking(move || {
                Self::fetch_page(&root, recursive, page_size, &cursor)
            })
            .await;

            match joined {
                Ok((page, has_more)) => {
                    debug!(count = page.len(), has_more, "Directory page ready");
                    // Flags settle before the page is visible to the grid.
                    state.finish_fetch(has_more);
                    sender.send(page);
                }
                Err(e) => {
                    warn!("Directory fetch task failed: {}", e);
                    state.finish_fetch(false);
                }
            }
        });
    }
}
