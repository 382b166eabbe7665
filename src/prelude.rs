//! Prelude module for common geolabel types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use geolabel::prelude::*;`

pub use crate::core::{
    config::{
        FadeConfig, FetchConfig, LabelEngineOptions, LabelEngineProfile, PlacementConfig,
        SchedulerConfig,
    },
    geo::{LatLng, Point, TileKey, ViewRectangle},
    viewport::{CameraFrame, ScreenSize, StaticViewport, ViewerEvent, ViewportProvider},
};

pub use crate::labels::{
    height_to_zoom, height_to_zoom_float, tier_for, KindSet, LabelFeature, LabelHandle, LabelKind,
    LabelSink, MemorySink, PlacementResolver, RenderableLabel, Tier,
};

pub use crate::tiles::{
    nearest_tile_keys, tile_keys_for_view, FetchCoordinator, HttpTileFetcher, StaticTileFetcher, TileFetcher,
    UrlTemplate,
};

pub use crate::animation::FadeDriver;
pub use crate::engine::{EngineStats, LabelEngine};
pub use crate::scheduler::Scheduler;

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::{LabelError, Result};

pub use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
