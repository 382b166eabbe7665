//! Engine-wide constants shared by the indexer, tiering and placement code.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Smallest fetch zoom the height table produces (furthest out).
pub const MIN_LABEL_ZOOM: u8 = 2;

/// Largest fetch zoom the height table produces (closest in).
pub const MAX_LABEL_ZOOM: u8 = 13;

/// Camera height (meters) / zoom anchors, ordered from far to near.
///
/// At exactly `height` the continuous zoom equals `zoom`; between two anchors
/// it is linearly interpolated. The integer fetch zoom is the zoom of the last
/// anchor whose height is still at or above the camera, which keeps it equal
/// to the floor of the continuous value.
pub const HEIGHT_ZOOM_BREAKPOINTS: [(f64, u8); 12] = [
    (20_000_000.0, 2),
    (10_000_000.0, 3),
    (5_000_000.0, 4),
    (2_500_000.0, 5),
    (1_500_000.0, 6),
    (1_000_000.0, 7),
    (750_000.0, 8),
    (550_000.0, 9),
    (400_000.0, 10),
    (250_000.0, 11),
    (120_000.0, 12),
    (60_000.0, 13),
];

/// Extra ring of tiles fetched around the visible rectangle.
pub const TILE_BORDER: u32 = 1;

/// Opacity at or below which a fading-out label is considered gone.
pub const OPACITY_EPSILON: f32 = 0.01;

/// Line height as a multiple of font size when estimating label boxes.
pub const LINE_HEIGHT_FACTOR: f64 = 1.2;
