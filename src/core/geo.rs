use crate::{LabelError, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Mean earth radius used for the spherical occluder
pub const EARTH_RADIUS: f64 = 6378137.0;
/// Web Mercator latitude limit
pub const MAX_LATITUDE: f64 = 85.0511287798;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Wraps longitude to [-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = lng % 360.0;
        if wrapped > 180.0 {
            wrapped - 360.0
        } else if wrapped < -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the Mercator-safe range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Point on the sphere of radius `EARTH_RADIUS`, earth-centred earth-fixed.
    pub fn to_cartesian(&self) -> Vector3<f64> {
        let lat = self.lat.to_radians();
        let lng = self.lng.to_radians();
        Vector3::new(
            EARTH_RADIUS * lat.cos() * lng.cos(),
            EARTH_RADIUS * lat.cos() * lng.sin(),
            EARTH_RADIUS * lat.sin(),
        )
    }

    /// Cheap planar distance in degrees with the longitude delta taken across
    /// the shorter side of the antimeridian. Only used for ordering.
    pub fn wrapped_distance_sq(&self, other: &LatLng) -> f64 {
        let dlng = Self::wrap_lng(self.lng - other.lng);
        let dlat = self.lat - other.lat;
        dlng * dlng + dlat * dlat
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen coordinates (pixels, y down)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Visible ground rectangle in degrees. `west > east` means the view
/// crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRectangle {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl ViewRectangle {
    pub fn new(west: f64, east: f64, south: f64, north: f64) -> Self {
        Self {
            west,
            east,
            south,
            north,
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Longitude span in degrees, measured eastwards from `west`.
    pub fn lng_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            self.east + 360.0 - self.west
        } else {
            self.east - self.west
        }
    }

    /// Shortest-arc midpoint of the rectangle.
    pub fn center(&self) -> LatLng {
        let lng = LatLng::wrap_lng(self.west + self.lng_span() / 2.0);
        LatLng::new((self.south + self.north) / 2.0, lng)
    }

    /// Whether the rectangle contains the given coordinate, antimeridian-aware.
    pub fn contains(&self, point: &LatLng) -> bool {
        if point.lat < self.south || point.lat > self.north {
            return false;
        }
        if self.crosses_antimeridian() {
            point.lng >= self.west || point.lng <= self.east
        } else {
            point.lng >= self.west && point.lng <= self.east
        }
    }
}

/// Slippy-map tile address. Serialized canonically as `"z/x/y"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom
    pub fn tiles_per_axis(zoom: u8) -> u32 {
        1u32 << zoom
    }

    /// Converts the tile's northwest corner to LatLng
    pub fn north_west(&self) -> LatLng {
        corner_to_lat_lng(self.x, self.y, self.z)
    }

    /// Geographic bounds of the tile as a (non-wrapping) rectangle
    pub fn bounds(&self) -> ViewRectangle {
        let nw = corner_to_lat_lng(self.x, self.y, self.z);
        let se = corner_to_lat_lng(self.x + 1, self.y + 1, self.z);
        ViewRectangle::new(nw.lng, se.lng, se.lat, nw.lat)
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        let max_coord = Self::tiles_per_axis(self.z);
        self.x < max_coord && self.y < max_coord
    }
}

fn corner_to_lat_lng(x: u32, y: u32, z: u8) -> LatLng {
    let n = 2_f64.powi(z as i32);
    let lng = x as f64 / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan();
    LatLng::new(lat_rad.to_degrees(), lng)
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl FromStr for TileKey {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LabelError::InvalidTileKey(s.to_string());
        let mut parts = s.split('/');
        let (Some(z), Some(x), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let z: u8 = z.trim().parse().map_err(|_| invalid())?;
        let x: u32 = x.trim().parse().map_err(|_| invalid())?;
        let y: u32 = y.trim().parse().map_err(|_| invalid())?;
        if z > 30 {
            return Err(invalid());
        }
        let key = TileKey::new(z, x, y);
        if !key.is_valid() {
            return Err(invalid());
        }
        Ok(key)
    }
}
