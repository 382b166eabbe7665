//! Configuration system for label fetching, placement and animation tuning
//!
//! Every tunable the engine uses lives here, grouped per component. Callers
//! pick a preset through [`LabelEngineProfile`] or build a custom
//! [`LabelEngineOptions`].

use crate::labels::LabelKind;
use crate::{LabelError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LabelEngineProfile {
    #[default]
    Balanced,
    LowResource,
    Dense,
    Custom(LabelEngineOptions),
}

impl LabelEngineProfile {
    pub fn resolve(&self) -> LabelEngineOptions {
        match self {
            Self::Balanced => LabelEngineOptions::default(),
            Self::LowResource => LabelEngineOptions {
                fetch: FetchConfig {
                    fan_out: 2,
                    max_tiles_near: 32,
                    max_tiles_far: 12,
                    cache_capacity: 96,
                    ..FetchConfig::default()
                },
                placement: PlacementConfig {
                    min_visible_labels: 4,
                    ..PlacementConfig::default()
                },
                fade: FadeConfig { duration_ms: 100 },
                scheduler: SchedulerConfig {
                    debounce_ms: 250,
                    placement_interval_ms: 200,
                    ..SchedulerConfig::default()
                },
            },
            Self::Dense => LabelEngineOptions {
                fetch: FetchConfig {
                    fan_out: 10,
                    max_tiles_near: 96,
                    max_tiles_far: 32,
                    cache_capacity: 512,
                    ..FetchConfig::default()
                },
                placement: PlacementConfig {
                    cell_size_px: 48.0,
                    min_visible_labels: 12,
                    box_padding_px: 2.0,
                    ..PlacementConfig::default()
                },
                fade: FadeConfig::default(),
                scheduler: SchedulerConfig {
                    placement_interval_ms: 50,
                    ..SchedulerConfig::default()
                },
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelEngineOptions {
    pub fetch: FetchConfig,
    pub placement: PlacementConfig,
    pub fade: FadeConfig,
    pub scheduler: SchedulerConfig,
}

impl LabelEngineOptions {
    /// Parse options from JSON; missing sections fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(LabelError::InvalidConfig(msg.to_string()));
        if self.fetch.fan_out == 0 {
            return invalid("fetch.fan_out must be at least 1");
        }
        if self.fetch.max_tiles_near == 0 || self.fetch.max_tiles_far == 0 {
            return invalid("tile caps must be at least 1");
        }
        if self.fetch.cache_capacity < self.fetch.max_tiles_near.max(self.fetch.max_tiles_far) {
            return invalid("fetch.cache_capacity must hold at least one full tile cap");
        }
        if self.placement.cell_size_px <= 0.0 {
            return invalid("placement.cell_size_px must be positive");
        }
        if self.placement.glyph_width_factor <= 0.0 {
            return invalid("placement.glyph_width_factor must be positive");
        }
        if self.placement.box_padding_px < 0.0 {
            return invalid("placement.box_padding_px must not be negative");
        }
        if self.placement.font_size_px.iter().any(|s| *s <= 0.0) {
            return invalid("placement.font_size_px entries must be positive");
        }
        if self.fade.duration_ms == 0 {
            return invalid("fade.duration_ms must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum concurrent tile requests inside one batch
    pub fan_out: usize,
    /// Tile cap per batch when zoomed in
    pub max_tiles_near: usize,
    /// Tile cap per batch at or below `far_zoom_threshold`
    pub max_tiles_far: usize,
    pub far_zoom_threshold: u8,
    /// LRU capacity of the tile cache, in tiles
    pub cache_capacity: usize,
    pub request_timeout_ms: u64,
}

impl FetchConfig {
    pub fn tile_cap(&self, zoom: u8) -> usize {
        if zoom <= self.far_zoom_threshold {
            self.max_tiles_far
        } else {
            self.max_tiles_near
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fan_out: 6,
            max_tiles_near: 64,
            max_tiles_far: 24,
            far_zoom_threshold: 4,
            cache_capacity: 256,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Edge of one spatial hash cell in screen pixels
    pub cell_size_px: f64,
    /// Below this many accepted display-tier labels the fallback pass runs
    pub min_visible_labels: usize,
    /// Font size per kind, indexed by [`LabelKind::priority`]
    pub font_size_px: [f64; 6],
    /// Average glyph advance as a fraction of the font size
    pub glyph_width_factor: f64,
    pub box_padding_px: f64,
    /// Minimum dot product between the camera-to-label direction and the view
    /// direction; anything below is behind the camera
    pub forward_dot_threshold: f64,
}

impl PlacementConfig {
    pub fn font_size(&self, kind: LabelKind) -> f64 {
        self.font_size_px[kind.priority()]
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            cell_size_px: 64.0,
            min_visible_labels: 6,
            font_size_px: [22.0, 18.0, 15.0, 14.0, 13.0, 12.0],
            glyph_width_factor: 0.6,
            box_padding_px: 4.0,
            forward_dot_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeConfig {
    pub duration_ms: u64,
}

impl FadeConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self { duration_ms: 160 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quiet period after the last camera change before fetching
    pub debounce_ms: u64,
    /// Camera height drift (meters) that triggers a fetch without an event
    pub idle_height_threshold_m: f64,
    /// Minimum spacing between throttled placement passes
    pub placement_interval_ms: u64,
}

impl SchedulerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn placement_interval(&self) -> Duration {
        Duration::from_millis(self.placement_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 120,
            idle_height_threshold_m: 1.0,
            placement_interval_ms: 100,
        }
    }
}
