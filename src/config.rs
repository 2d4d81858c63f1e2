//! Engine configuration and the keyed preference store.
//!
//! The store is a plain in-memory map handed to the engine at session
//! boundaries; the engine never reads ambient global state.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

/// Default target row height in pixels (medium density).
pub const DEFAULT_TARGET_HEIGHT: f32 = 200.0;

/// Default gap between items and between rows, in pixels.
pub const DEFAULT_SPACING: f32 = 4.0;

/// Rows rendered above and below the viewport.
pub const DEFAULT_OVERSCAN_ROWS: usize = 3;

/// Rendered width at or above which every annotation box is drawn.
pub const DEFAULT_LOD_THRESHOLD: f32 = 150.0;

/// Box budget for cells rendered below the LOD threshold.
pub const DEFAULT_LOD_MAX_BOXES: usize = 20;

/// Inputs of the row packer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub container_width: f32,
    pub target_row_height: f32,
    pub spacing: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            container_width: 0.0,
            target_row_height: DEFAULT_TARGET_HEIGHT,
            spacing: DEFAULT_SPACING,
        }
    }
}

impl LayoutConfig {
    pub fn new(container_width: f32, target_row_height: f32, spacing: f32) -> Self {
        Self {
            container_width,
            target_row_height,
            spacing,
        }
    }

    /// Replaces values the packer cannot work with by safe defaults:
    /// width collapses to 0 (no layout), height to the default, spacing to 0.
    pub fn sanitized(&self) -> Self {
        let container_width = if self.container_width.is_finite() {
            self.container_width.max(0.0)
        } else {
            0.0
        };
        let target_row_height =
            if self.target_row_height.is_finite() && self.target_row_height > 0.0 {
                self.target_row_height
            } else {
                DEFAULT_TARGET_HEIGHT
            };
        let spacing = if self.spacing.is_finite() {
            self.spacing.max(0.0)
        } else {
            0.0
        };
        Self {
            container_width,
            target_row_height,
            spacing,
        }
    }
}

/// Discrete thumbnail density presets offered by the zoom control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ZoomLevel {
    /// Many small thumbnails.
    Many,
    #[default]
    Medium,
    /// Few large thumbnails.
    Few,
}

impl ZoomLevel {
    pub fn target_row_height(self) -> f32 {
        match self {
            Self::Many => 120.0,
            Self::Medium => DEFAULT_TARGET_HEIGHT,
            Self::Few => 320.0,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "many" | "small" => Some(Self::Many),
            "medium" => Some(Self::Medium),
            "few" | "large" => Some(Self::Few),
            _ => None,
        }
    }

    pub fn zoom_in(self) -> Self {
        match self {
            Self::Many => Self::Medium,
            Self::Medium | Self::Few => Self::Few,
        }
    }

    pub fn zoom_out(self) -> Self {
        match self {
            Self::Few => Self::Medium,
            Self::Medium | Self::Many => Self::Many,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodSettings {
    pub threshold_px: f32,
    pub max_boxes: usize,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            threshold_px: DEFAULT_LOD_THRESHOLD,
            max_boxes: DEFAULT_LOD_MAX_BOXES,
        }
    }
}

/// Everything the grid engine needs apart from the images themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub layout: LayoutConfig,
    pub overscan_rows: usize,
    pub lod: LodSettings,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            overscan_rows: DEFAULT_OVERSCAN_ROWS,
            lod: LodSettings::default(),
        }
    }
}

/// Per-collection presentation choices, saved when a session ends and
/// restored when the same collection is opened again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPreferences {
    pub zoom: ZoomLevel,
    pub spacing: f32,
    pub lod: LodSettings,
}

impl Default for GridPreferences {
    fn default() -> Self {
        Self {
            zoom: ZoomLevel::default(),
            spacing: DEFAULT_SPACING,
            lod: LodSettings::default(),
        }
    }
}

impl GridPreferences {
    /// Builds the engine configuration for a container of the given width.
    pub fn to_config(&self, container_width: f32) -> GridConfig {
        GridConfig {
            layout: LayoutConfig::new(
                container_width,
                self.zoom.target_row_height(),
                self.spacing,
            ),
            overscan_rows: DEFAULT_OVERSCAN_ROWS,
            lod: self.lod,
        }
    }
}

/// Keyed store of [`GridPreferences`], one entry per collection key.
#[derive(Default)]
pub struct PreferenceStore {
    entries: RwLock<HashMap<String, GridPreferences>>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preferences for `key`, or defaults when the collection is new.
    pub fn load(&self, key: &str) -> GridPreferences {
        let prefs = self.entries.read().get(key).copied();
        debug!(key, found = prefs.is_some(), "Loading grid preferences");
        prefs.unwrap_or_default()
    }

    pub fn save(&self, key: &str, prefs: GridPreferences) {
        debug!(key, zoom = ?prefs.zoom, "Saving grid preferences");
        self.entries.write().insert(key.to_string(), prefs);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_layout() {
        let cfg = LayoutConfig::new(f32::NAN, -5.0, f32::INFINITY).sanitized();
        assert_eq!(cfg.container_width, 0.0);
        assert_eq!(cfg.target_row_height, DEFAULT_TARGET_HEIGHT);
        assert_eq!(cfg.spacing, 0.0);

        let ok = LayoutConfig::new(1000.0, 180.0, 6.0);
        assert_eq!(ok.sanitized(), ok);
    }

    #[test]
    fn test_zoom_steps_saturate() {
        assert_eq!(ZoomLevel::Many.zoom_out(), ZoomLevel::Many);
        assert_eq!(ZoomLevel::Many.zoom_in(), ZoomLevel::Medium);
        assert_eq!(ZoomLevel::Few.zoom_in(), ZoomLevel::Few);
        assert!(ZoomLevel::Many.target_row_height() < ZoomLevel::Few.target_row_height());
        assert_eq!(ZoomLevel::from_name("Large"), Some(ZoomLevel::Few));
        assert_eq!(ZoomLevel::from_name("huge"), None);
        assert_eq!(ZoomLevel::default(), ZoomLevel::Medium);
    }

    #[test]
    fn test_store_round_trip_per_key() {
        let store = PreferenceStore::new();
        assert!(store.is_empty());
        assert_eq!(store.load("project-a"), GridPreferences::default());

        let prefs = GridPreferences {
            zoom: ZoomLevel::Few,
            spacing: 8.0,
            lod: LodSettings::default(),
        };
        store.save("project-a", prefs);

        assert_eq!(store.load("project-a"), prefs);
        assert_eq!(store.load("project-b").zoom, ZoomLevel::Medium);
        assert!(store.remove("project-a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_preferences_to_config() {
        let prefs = GridPreferences {
            zoom: ZoomLevel::Many,
            ..Default::default()
        };
        let cfg = prefs.to_config(1280.0);
        assert_eq!(cfg.layout.container_width, 1280.0);
        assert_eq!(cfg.layout.target_row_height, 120.0);
    }
}
