pub mod cache;
pub mod index;
pub mod loader;
pub mod source;

// Re-exports for convenience
pub use cache::{CoordinatorStats, FetchCoordinator, FetchMessage, PollSummary, RequestOutcome};
pub use index::{
    lat_to_tile_y, lon_to_tile_x, nearest_tile_keys, tile_center, tile_keys_for_view, TileCoverage,
};
pub use loader::{decode_payload, HttpTileFetcher, StaticTileFetcher, TileFetcher};
pub use source::{TileSource, UrlTemplate};
