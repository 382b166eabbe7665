//! Label data, zoom tiers, the renderer-facing sink and collision placement.

pub mod kind;
pub mod placement;
pub mod sink;
pub mod tier;

pub use kind::{KindSet, LabelFeature, LabelKind};
pub use placement::{Candidate, PlacedLabel, PlacementOutcome, PlacementResolver, Rejection};
pub use sink::{LabelHandle, LabelSink, MemorySink, RenderableLabel, SinkEntry};
pub use tier::{height_to_zoom, height_to_zoom_float, tier_for, Tier};
