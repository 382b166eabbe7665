//! Tile transport: the async fetch seam, an HTTP implementation, an
//! in-memory implementation, and payload decoding.

use super::index::{lat_to_tile_y, lon_to_tile_x};
use super::source::{TileSource, UrlTemplate};
use crate::core::geo::TileKey;
use crate::labels::{LabelFeature, LabelKind};
use crate::prelude::{Arc, HashMap, HashSet, Mutex};
use crate::{LabelError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Shared async HTTP client, built once so connection pools are reused
/// across tiles and batches.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("geolabel/", env!("CARGO_PKG_VERSION")))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .expect("failed to build reqwest async client")
});

/// Fetches and decodes one tile's label payload.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, key: TileKey) -> Result<Vec<LabelFeature>>;
}

/// One `GET` per tile against a [`TileSource`].
pub struct HttpTileFetcher {
    source: Box<dyn TileSource>,
    timeout: Duration,
}

impl HttpTileFetcher {
    pub fn new(source: impl TileSource + 'static, timeout: Duration) -> Self {
        Self {
            source: Box::new(source),
            timeout,
        }
    }

    pub fn from_template(template: &str, timeout: Duration) -> Result<Self> {
        Ok(Self::new(UrlTemplate::new(template)?, timeout))
    }

    async fn download(&self, key: TileKey) -> Result<Vec<u8>> {
        let url = self.source.url(key);
        log::debug!("fetch tile {} from {}", key, url);
        let response = HTTP_CLIENT.get(&url).timeout(self.timeout).send().await?;
        if !response.status().is_success() {
            return Err(LabelError::FetchFailed {
                key,
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, key: TileKey) -> Result<Vec<LabelFeature>> {
        let bytes = self.download(key).await.map_err(|e| e.for_tile(key))?;
        decode_payload(&bytes).map_err(|e| e.for_tile(key))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Features(Vec<RawFeature>),
    Collection(FeatureCollection),
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(alias = "lng")]
    lon: f64,
    lat: f64,
    name: String,
    kind: String,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<GeoJsonFeature>,
}

#[derive(Deserialize)]
struct GeoJsonFeature {
    geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    properties: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct GeoJsonGeometry {
    #[serde(rename = "type")]
    geometry_type: String,
    coordinates: serde_json::Value,
}

fn label_from_geojson(feature: GeoJsonFeature) -> Option<LabelFeature> {
    let geometry = feature.geometry?;
    if geometry.geometry_type != "Point" {
        return None;
    }
    let coords = geometry.coordinates.as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    let name = feature.properties.get("name")?.as_str()?.to_string();
    let kind = feature.properties.get("kind")?.as_str()?.parse().ok()?;
    Some(LabelFeature::new(lon, lat, name, kind))
}

/// Decode a tile payload: either a JSON array of `{lon, lat, name, kind}` or
/// a GeoJSON `FeatureCollection` of points. Entries with unknown kinds or
/// non-point geometry are skipped.
pub fn decode_payload(bytes: &[u8]) -> Result<Vec<LabelFeature>> {
    let payload: Payload = serde_json::from_slice(bytes)?;
    let features: Vec<LabelFeature> = match payload {
        Payload::Features(raw) => raw
            .into_iter()
            .filter_map(|f| {
                let kind: LabelKind = f.kind.parse().ok()?;
                Some(LabelFeature::new(f.lon, f.lat, f.name, kind))
            })
            .collect(),
        Payload::Collection(collection) => collection
            .features
            .into_iter()
            .filter_map(label_from_geojson)
            .collect(),
    };
    Ok(features)
}

#[derive(Debug, Default)]
struct StaticTiles {
    tiles: HashMap<TileKey, Vec<LabelFeature>>,
    failing: HashSet<TileKey>,
    stalled: HashMap<TileKey, Duration>,
    calls: HashMap<TileKey, usize>,
}

/// In-memory fetcher serving pre-bucketed features, with optional latency.
/// Clones share the same tiles and call counters.
#[derive(Debug, Clone, Default)]
pub struct StaticTileFetcher {
    inner: Arc<Mutex<StaticTiles>>,
    latency: Duration,
}

impl StaticTileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket every feature into the tile containing it at each zoom in `zooms`.
    pub fn from_features(features: &[LabelFeature], zooms: RangeInclusive<u8>) -> Self {
        let fetcher = Self::new();
        for zoom in zooms {
            for feature in features {
                let key = TileKey::new(
                    zoom,
                    lon_to_tile_x(feature.lon, zoom),
                    lat_to_tile_y(feature.lat, zoom),
                );
                fetcher.add(key, feature.clone());
            }
        }
        fetcher
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn add(&self, key: TileKey, feature: LabelFeature) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.tiles.entry(key).or_default().push(feature);
        }
    }

    /// Make every fetch of `key` fail
    pub fn fail(&self, key: TileKey) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.insert(key);
        }
    }

    /// Delay every fetch of `key` by `delay` on top of the shared latency
    pub fn stall(&self, key: TileKey, delay: Duration) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.stalled.insert(key, delay);
        }
    }

    pub fn heal(&self, key: TileKey) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.remove(&key);
        }
    }

    pub fn fetch_count(&self, key: TileKey) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.calls.get(&key).copied())
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.calls.values().sum())
            .unwrap_or(0)
    }

    /// Keys fetched so far, sorted
    pub fn fetched_keys(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self
            .inner
            .lock()
            .map(|inner| inner.calls.keys().copied().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl TileFetcher for StaticTileFetcher {
    async fn fetch(&self, key: TileKey) -> Result<Vec<LabelFeature>> {
        let delay = match self.inner.lock() {
            Ok(mut inner) => {
                *inner.calls.entry(key).or_default() += 1;
                self.latency + inner.stalled.get(&key).copied().unwrap_or_default()
            }
            Err(_) => self.latency,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let inner = self
            .inner
            .lock()
            .map_err(|_| LabelError::FetchFailed {
                key,
                reason: "tile store poisoned".to_string(),
            })?;
        if inner.failing.contains(&key) {
            return Err(LabelError::FetchFailed {
                key,
                reason: "simulated failure".to_string(),
            });
        }
        Ok(inner.tiles.get(&key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_array() {
        let json = br#"[
            {"lon": 2.35, "lat": 48.85, "name": "Paris", "kind": "cityLarge"},
            {"lng": 4.83, "lat": 45.76, "name": "Lyon", "kind": "city_medium"},
            {"lon": 0.0, "lat": 0.0, "name": "Null Island", "kind": "island"}
        ]"#;
        let features = decode_payload(json).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].name, "Paris");
        assert_eq!(features[1].kind, LabelKind::CityMedium);
    }

    #[test]
    fn test_decode_geojson_points() {
        let json = br#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature",
                 "geometry": {"type": "Point", "coordinates": [10.0, 51.0]},
                 "properties": {"name": "Germany", "kind": "country"}},
                {"type": "Feature",
                 "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
                 "properties": {"name": "Road", "kind": "country"}}
            ]
        }"#;
        let features = decode_payload(json).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].lon, 10.0);
        assert_eq!(features[0].kind, LabelKind::Country);
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = decode_payload(b"<html>").unwrap_err();
        assert!(matches!(err, LabelError::Decode(_)));
    }

    #[tokio::test]
    async fn test_static_fetcher_buckets_and_counts() {
        let paris = LabelFeature::new(2.3522, 48.8566, "Paris", LabelKind::CityLarge);
        let fetcher = StaticTileFetcher::from_features(&[paris], 10..=10);
        let key = TileKey::new(10, 518, 352);

        let features = fetcher.fetch(key).await.unwrap();
        assert_eq!(features.len(), 1);
        assert!(fetcher.fetch(TileKey::new(10, 0, 0)).await.unwrap().is_empty());
        assert_eq!(fetcher.fetch_count(key), 1);
        assert_eq!(fetcher.total_fetches(), 2);

        fetcher.fail(key);
        assert!(matches!(
            fetcher.fetch(key).await,
            Err(LabelError::FetchFailed { .. })
        ));
    }
}
