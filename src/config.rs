use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::EditorResult;
use crate::layer::Size;

/// Storage key for the persisted layer sequence
pub const STORAGE_KEY: &str = "card-editor:layers";
/// Storage key for the canvas title preference
pub const CANVAS_TITLE_KEY: &str = "card-editor:canvas-title";
/// Storage key for the undo capacity preference
pub const UNDO_HISTORY_SIZE_KEY: &str = "card-editor:undo-history-size";

pub const DEFAULT_UNDO_HISTORY_SIZE: usize = 50;
pub const MIN_UNDO_HISTORY_SIZE: usize = 10;
pub const MAX_UNDO_HISTORY_SIZE: usize = 200;

pub const DEFAULT_CANVAS_TITLE: &str = "Untitled Card";

/// Top-level editor configuration.
///
/// Every group falls back to its defaults, so a partial JSON file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub storage: StorageKeys,
    pub history: HistorySettings,
    pub layer_defaults: LayerDefaults,
    pub export: ExportSettings,
    pub batch: BatchPresets,
    /// Nominal size of the board in canvas units
    pub canvas_size: Size,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            storage: StorageKeys::default(),
            history: HistorySettings::default(),
            layer_defaults: LayerDefaults::default(),
            export: ExportSettings::default(),
            batch: BatchPresets::default(),
            canvas_size: Size::new(800.0, 600.0),
        }
    }
}

impl EditorConfig {
    /// Load a config from a JSON file
    pub fn load(path: &Path) -> EditorResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        log::info!("Loaded editor config from {}", path.display());
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub layers: String,
    pub canvas_title: String,
    pub history_size: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            layers: STORAGE_KEY.to_owned(),
            canvas_title: CANVAS_TITLE_KEY.to_owned(),
            history_size: UNDO_HISTORY_SIZE_KEY.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_UNDO_HISTORY_SIZE,
        }
    }
}

/// Clamp a requested undo capacity into the supported range
pub fn clamp_history_capacity(requested: usize) -> usize {
    requested.clamp(MIN_UNDO_HISTORY_SIZE, MAX_UNDO_HISTORY_SIZE)
}

/// Defaults applied when layers are created from assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerDefaults {
    pub drop_position: [f32; 2],
    pub duplicate_offset: [f32; 2],
    pub text_size: Size,
    pub image_size: Size,
    pub placeholder_text: String,
    pub font_size: f32,
    pub font_family: String,
}

impl Default for LayerDefaults {
    fn default() -> Self {
        Self {
            drop_position: [180.0, 160.0],
            duplicate_offset: [20.0, 20.0],
            text_size: Size::new(260.0, 120.0),
            image_size: Size::new(200.0, 260.0),
            placeholder_text: "Double-click to edit text".to_owned(),
            font_size: 18.0,
            font_family: "Arial".to_owned(),
        }
    }
}

/// Tunables of the raster export pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Padding around the geometric bounds, in canvas units
    pub bounds_padding: f32,
    /// Pixel density of the rendered surface
    pub pixel_ratio: f32,
    /// Padding around the detected content, in pixels
    pub crop_padding: u32,
    /// Pixels sampled inward from each corner for background detection
    pub background_samples: u32,
    /// Per-channel RGB tolerance when the background is opaque
    pub color_tolerance: u8,
    /// Alpha below this counts as transparent
    pub alpha_threshold: u8,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            bounds_padding: 5.0,
            pixel_ratio: 2.0,
            crop_padding: 5,
            background_samples: 10,
            color_tolerance: 5,
            alpha_threshold: 10,
        }
    }
}

/// Group size and pause between groups for batch export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    pub group_size: usize,
    pub interval_ms: u64,
}

impl BatchSettings {
    /// Writing into a picked directory
    pub const DIRECTORY: Self = Self {
        group_size: 5,
        interval_ms: 500,
    };

    /// Writing through individual downloads, which browsers throttle harder
    pub const DOWNLOADS: Self = Self {
        group_size: 3,
        interval_ms: 1000,
    };

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPresets {
    pub directory: BatchSettings,
    pub downloads: BatchSettings,
}

impl Default for BatchPresets {
    fn default() -> Self {
        Self {
            directory: BatchSettings::DIRECTORY,
            downloads: BatchSettings::DOWNLOADS,
        }
    }
}
