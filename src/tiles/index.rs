//! Web-Mercator slippy-tile math and view-rectangle coverage.

use crate::core::constants::TILE_BORDER;
use crate::core::geo::{LatLng, TileKey, ViewRectangle};
use crate::prelude::HashSet;
use std::f64::consts::PI;

fn max_index(zoom: u8) -> i64 {
    TileKey::tiles_per_axis(zoom) as i64 - 1
}

/// Tile column for a longitude, clamped to `[0, 2^zoom - 1]`.
pub fn lon_to_tile_x(lon: f64, zoom: u8) -> u32 {
    let n = 2_f64.powi(zoom as i32);
    let x = ((lon + 180.0) / 360.0 * n).floor();
    (x as i64).clamp(0, max_index(zoom)) as u32
}

/// Tile row for a latitude; latitude is clamped to the Mercator limit first.
pub fn lat_to_tile_y(lat: f64, zoom: u8) -> u32 {
    let lat_rad = LatLng::clamp_lat(lat).to_radians();
    let n = 2_f64.powi(zoom as i32);
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();
    (y as i64).clamp(0, max_index(zoom)) as u32
}

/// Geographic centre of a tile
pub fn tile_center(x: u32, y: u32, zoom: u8) -> LatLng {
    let n = 2_f64.powi(zoom as i32);
    let lng = (x as f64 + 0.5) / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * (y as f64 + 0.5) / n)).sinh().atan().to_degrees();
    LatLng::new(lat, lng)
}

/// Tiles covering a view plus its centre
#[derive(Debug, Clone, PartialEq)]
pub struct TileCoverage {
    pub keys: Vec<TileKey>,
    pub center: LatLng,
}

impl TileCoverage {
    /// Keep the `cap` tiles closest to the centre, nearest first.
    pub fn prioritized(self, cap: usize) -> Vec<TileKey> {
        nearest_first(by_distance(self.keys, &self.center), cap)
    }
}

fn by_distance(keys: impl IntoIterator<Item = TileKey>, center: &LatLng) -> Vec<(f64, TileKey)> {
    keys.into_iter()
        .map(|key| (tile_center(key.x, key.y, key.z).wrapped_distance_sq(center), key))
        .collect()
}

fn nearest_first(mut ranked: Vec<(f64, TileKey)>, cap: usize) -> Vec<TileKey> {
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    ranked.truncate(cap);
    ranked.into_iter().map(|(_, key)| key).collect()
}

/// Column spans and row range a view covers at one zoom, border included
struct CoverSpans {
    zoom: u8,
    columns: Vec<(u32, u32)>,
    rows: (u32, u32),
}

impl CoverSpans {
    fn new(rect: &ViewRectangle, zoom: u8) -> Self {
        let border = TILE_BORDER as i64;
        let max = max_index(zoom);
        let span = |west: f64, east: f64| {
            let x0 = (lon_to_tile_x(west, zoom) as i64 - border).max(0);
            let x1 = (lon_to_tile_x(east, zoom) as i64 + border).min(max);
            (x0 as u32, x1 as u32)
        };
        let columns = if rect.crosses_antimeridian() {
            vec![span(rect.west, 180.0), span(-180.0, rect.east)]
        } else {
            vec![span(rect.west, rect.east)]
        };
        let y0 = (lat_to_tile_y(rect.north, zoom) as i64 - border).max(0);
        let y1 = (lat_to_tile_y(rect.south, zoom) as i64 + border).min(max);
        Self {
            zoom,
            columns,
            rows: (y0 as u32, y1 as u32),
        }
    }

    fn has_column(&self, x: u32) -> bool {
        self.columns.iter().any(|(x0, x1)| (*x0..=*x1).contains(&x))
    }
}

/// Every tile intersecting `rect` plus a one-tile border. A rectangle with
/// `west > east` is split at the antimeridian and both halves are covered.
///
/// The result grows with the square of the tile count across the view; use
/// [`nearest_tile_keys`] when only a capped set is needed.
pub fn tile_keys_for_view(rect: &ViewRectangle, zoom: u8) -> TileCoverage {
    let spans = CoverSpans::new(rect, zoom);
    let mut keys = HashSet::default();
    for (x0, x1) in &spans.columns {
        for x in *x0..=*x1 {
            for y in spans.rows.0..=spans.rows.1 {
                keys.insert(TileKey::new(zoom, x, y));
            }
        }
    }
    let mut keys: Vec<TileKey> = keys.into_iter().collect();
    keys.sort();
    TileCoverage {
        keys,
        center: rect.center(),
    }
}

/// The `cap` tiles of [`tile_keys_for_view`] nearest the view centre, nearest
/// first, without enumerating the whole coverage.
///
/// Tiles are gathered from a square window around the centre that doubles
/// until it holds `cap` tiles within its inscribed radius. Every tile closer
/// than that radius lies in the window, so the result matches
/// `tile_keys_for_view(rect, zoom).prioritized(cap)`.
pub fn nearest_tile_keys(rect: &ViewRectangle, zoom: u8, cap: usize) -> Vec<TileKey> {
    if cap == 0 {
        return Vec::new();
    }
    let spans = CoverSpans::new(rect, zoom);
    let center = rect.center();
    let n = TileKey::tiles_per_axis(zoom) as i64;
    let tile_deg = 360.0 / n as f64;
    let cx = lon_to_tile_x(center.lng, zoom) as i64;

    let mut radius = tile_deg * ((cap as f64).sqrt() / 2.0 + 1.0);
    loop {
        let window = window_keys(&spans, &center, cx, radius, tile_deg);
        let inside = window.iter().filter(|(d, _)| *d <= radius * radius).count();
        if inside >= cap || radius >= 360.0 {
            return nearest_first(window, cap);
        }
        radius = (radius * 2.0).min(360.0);
    }
}

/// Covered tiles whose centre may lie within `radius` degrees of `center`
/// along both axes, with their squared distances.
fn window_keys(
    spans: &CoverSpans,
    center: &LatLng,
    cx: i64,
    radius: f64,
    tile_deg: f64,
) -> Vec<(f64, TileKey)> {
    let zoom = spans.zoom;
    let n = TileKey::tiles_per_axis(zoom) as i64;
    let reach = (radius / tile_deg).ceil() as i64 + 2;
    let columns: Vec<u32> = if 2 * reach + 1 >= n {
        (0..n as u32).collect()
    } else {
        (-reach..=reach)
            .map(|dx| (cx + dx).rem_euclid(n) as u32)
            .collect()
    };
    let y0 = (lat_to_tile_y(center.lat + radius, zoom) as i64 - 1).max(spans.rows.0 as i64);
    let y1 = (lat_to_tile_y(center.lat - radius, zoom) as i64 + 1).min(spans.rows.1 as i64);
    if y0 > y1 {
        return Vec::new();
    }

    let keys = columns
        .into_iter()
        .filter(|x| spans.has_column(*x))
        .flat_map(|x| (y0 as u32..=y1 as u32).map(move |y| TileKey::new(zoom, x, y)));
    by_distance(keys, center)
}
