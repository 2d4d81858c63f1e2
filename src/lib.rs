//! Windowed justified-layout engine for large image grids.
//!
//! Images are packed into rows that fill the container width, only the
//! rows near the viewport are materialised, more pages are requested as
//! the window approaches the end, and per-image annotation boxes are drawn
//! with a level-of-detail cutoff.

pub mod bench;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod layout;
pub mod models;
pub mod overlay;

#[cfg(feature = "gtk")]
pub mod app;
#[cfg(feature = "gtk")]
pub mod ui;

pub use config::{GridConfig, LayoutConfig, LodSettings, PreferenceStore, ZoomLevel};
pub use engine::{GridEngine, VisibleCell};
pub use error::{FeedError, OverlayError};
pub use layout::{pack, FrameScheduler, ManualFrameScheduler};
pub use models::{BoundingBox, ImageId, ImageRecord, RowModel};
