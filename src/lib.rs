//! # geolabel
//!
//! Dynamic place-name labels for globe and map viewers.
//!
//! The engine turns the camera state a viewer reports into a set of slippy
//! tiles, fetches each tile's label payload asynchronously, keeps only the
//! label kinds that matter at the current zoom, places them greedily without
//! screen-space overlap and fades them in and out over wall-clock time.
//! Rendering stays on the viewer's side of the [`LabelSink`] trait.

pub mod animation;
pub mod core;
pub mod engine;
pub mod labels;
pub mod prelude;
pub mod runtime;
pub mod scheduler;
pub mod spatial;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{LabelEngineOptions, LabelEngineProfile},
    geo::{LatLng, Point, TileKey, ViewRectangle},
    viewport::{CameraFrame, ScreenSize, StaticViewport, ViewerEvent, ViewportProvider},
};

pub use labels::{
    height_to_zoom, height_to_zoom_float, tier_for, KindSet, LabelFeature, LabelHandle, LabelKind,
    LabelSink, MemorySink, PlacementResolver, RenderableLabel, Tier,
};

pub use tiles::{
    nearest_tile_keys, tile_keys_for_view, FetchCoordinator, HttpTileFetcher, StaticTileFetcher, TileFetcher,
    UrlTemplate,
};

pub use animation::FadeDriver;
pub use engine::{EngineStats, LabelEngine};
pub use scheduler::{FrameTick, Scheduler};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, LabelError>;

pub type Error = LabelError;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("fetch of tile {key} failed: {reason}")]
    FetchFailed { key: TileKey, reason: String },

    #[error("fetch of tile {0} cancelled")]
    Cancelled(TileKey),

    #[error("viewport has no ground rectangle")]
    NoViewRectangle,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid tile key: {0}")]
    InvalidTileKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LabelError {
    /// Cancellation is expected during zoom and viewport churn
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Attribute a transport or decode error to the tile it happened on.
    pub fn for_tile(self, key: TileKey) -> Self {
        match self {
            Self::FetchFailed { .. } | Self::Cancelled(_) => self,
            other => Self::FetchFailed {
                key,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_tile_wraps_decode_errors() {
        let key = TileKey::new(4, 8, 5);
        let decode = serde_json::from_str::<Vec<u8>>("nope").unwrap_err();
        let err = LabelError::from(decode).for_tile(key);
        match err {
            LabelError::FetchFailed { key: k, reason } => {
                assert_eq!(k, key);
                assert!(reason.starts_with("Decode error"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(LabelError::Cancelled(key).for_tile(key).is_cancellation());
    }
}
