//! Tile cache and fetch coordination.
//!
//! The coordinator exclusively owns the cached tiles, the pending set and the
//! in-flight batch. Fetches run on the async runtime; their results come back
//! over a channel and are applied only from [`FetchCoordinator::poll`], on the
//! caller's thread, so the cache is never written concurrently.

use super::loader::TileFetcher;
use crate::core::config::FetchConfig;
use crate::core::geo::TileKey;
use crate::labels::{KindSet, LabelFeature, LabelSink, RenderableLabel};
use crate::prelude::{Arc, HashSet};
use crate::runtime::{self, AsyncHandle};
use crate::{LabelError, Result};
use crossbeam_channel::{Receiver, Sender};
use futures::StreamExt;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio_util::sync::CancellationToken;

/// Completion messages sent by a running batch.
#[derive(Debug)]
pub enum FetchMessage {
    Tile {
        batch: u64,
        key: TileKey,
        result: Result<Vec<LabelFeature>>,
    },
    BatchDone {
        batch: u64,
    },
}

/// What [`FetchCoordinator::request_tiles`] did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Started { batch: u64, tiles: usize },
    /// A batch is in flight; the request replaces any earlier recorded re-run
    Coalesced,
    /// Every key was already cached or pending
    NothingToFetch,
}

/// Result of draining completions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub tiles_loaded: usize,
    pub labels_added: usize,
    pub tiles_failed: usize,
    pub batch_finished: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub batches_started: u64,
    pub batches_cancelled: u64,
    pub reruns: u64,
    pub tiles_loaded: u64,
    pub tiles_failed: u64,
    pub tiles_evicted: u64,
    pub stale_results: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct TileRequest {
    keys: Vec<TileKey>,
    zoom: u8,
    eligible: KindSet,
}

struct ActiveBatch {
    id: u64,
    eligible: KindSet,
    token: CancellationToken,
    handle: Box<dyn AsyncHandle>,
}

/// Labels of one tile and the kinds they were filtered to
struct CachedTile {
    eligible: KindSet,
    labels: Vec<RenderableLabel>,
}

pub struct FetchCoordinator {
    fetcher: Arc<dyn TileFetcher>,
    config: FetchConfig,
    cache: LruCache<TileKey, CachedTile>,
    pending: HashSet<TileKey>,
    current_zoom: Option<u8>,
    batch: Option<ActiveBatch>,
    rerun: Option<TileRequest>,
    next_batch: u64,
    tx: Sender<FetchMessage>,
    rx: Receiver<FetchMessage>,
    stats: CoordinatorStats,
}

impl FetchCoordinator {
    pub fn new(fetcher: Arc<dyn TileFetcher>, config: FetchConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            fetcher,
            config,
            cache: LruCache::new(capacity),
            pending: HashSet::default(),
            current_zoom: None,
            batch: None,
            rerun: None,
            next_batch: 0,
            tx,
            rx,
            stats: CoordinatorStats::default(),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn current_zoom(&self) -> Option<u8> {
        self.current_zoom
    }

    /// True while a batch is in flight
    pub fn is_busy(&self) -> bool {
        self.batch.is_some()
    }

    pub fn has_rerun(&self) -> bool {
        self.rerun.is_some()
    }

    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.pending.contains(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.cache.contains(key)
    }

    pub fn cached_tile_count(&self) -> usize {
        self.cache.len()
    }

    pub fn cached_label_count(&self) -> usize {
        self.cache.iter().map(|(_, tile)| tile.labels.len()).sum()
    }

    pub fn cached_keys(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self.cache.iter().map(|(k, _)| *k).collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn labels(&self, key: &TileKey) -> Option<&[RenderableLabel]> {
        self.cache.peek(key).map(|tile| tile.labels.as_slice())
    }

    /// Mark a tile as recently used. Returns false if it is not cached.
    pub fn promote(&mut self, key: &TileKey) -> bool {
        self.cache.get(key).is_some()
    }

    /// Every cached tile with its labels, in no particular order
    pub fn tiles_mut(&mut self) -> impl Iterator<Item = (&TileKey, &mut Vec<RenderableLabel>)> {
        self.cache.iter_mut().map(|(key, tile)| (key, &mut tile.labels))
    }

    pub fn labels_mut(&mut self) -> impl Iterator<Item = &mut RenderableLabel> {
        self.cache.iter_mut().flat_map(|(_, tile)| tile.labels.iter_mut())
    }

    /// Fetch every key in `keys` that is neither pending nor cached with at
    /// least the `eligible` kinds. A tile cached under a narrower set is
    /// fetched again and only the newly eligible kinds are added. A zoom
    /// different from the current fetch zoom evicts the cache first. While a
    /// batch is in flight the request is recorded and replayed once that
    /// batch completes.
    pub fn request_tiles(
        &mut self,
        keys: Vec<TileKey>,
        zoom: u8,
        eligible: KindSet,
        sink: &mut dyn LabelSink,
    ) -> RequestOutcome {
        self.on_zoom_changed(zoom, sink);

        if self.batch.is_some() {
            log::debug!("fetch batch in flight, recording re-run of {} tiles", keys.len());
            self.rerun = Some(TileRequest {
                keys,
                zoom,
                eligible,
            });
            return RequestOutcome::Coalesced;
        }

        let mut wanted = Vec::with_capacity(keys.len());
        for key in keys {
            if key.z != zoom || !key.is_valid() {
                log::debug!("skip tile {} outside fetch zoom {}", key, zoom);
                continue;
            }
            let covered = self
                .cache
                .peek(&key)
                .map_or(false, |tile| tile.eligible.is_superset_of(&eligible));
            if covered || !self.pending.insert(key) {
                continue;
            }
            wanted.push(key);
        }

        if wanted.is_empty() {
            return RequestOutcome::NothingToFetch;
        }

        let tiles = wanted.len();
        let batch = self.spawn_batch(wanted, eligible);
        RequestOutcome::Started { batch, tiles }
    }

    fn spawn_batch(&mut self, keys: Vec<TileKey>, eligible: KindSet) -> u64 {
        self.next_batch += 1;
        let id = self.next_batch;
        let token = CancellationToken::new();
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        let fan_out = self.config.fan_out.max(1);
        let timeout = self.config.request_timeout();
        let batch_token = token.clone();

        log::info!("fetch batch {} started: {} tiles, fan-out {}", id, keys.len(), fan_out);

        let handle = runtime::spawn(async move {
            futures::stream::iter(keys)
                .map(|key| {
                    let fetcher = Arc::clone(&fetcher);
                    let token = batch_token.clone();
                    async move {
                        let result = tokio::select! {
                            _ = token.cancelled() => Err(LabelError::Cancelled(key)),
                            fetched = tokio::time::timeout(timeout, fetcher.fetch(key)) => {
                                fetched.unwrap_or_else(|_| Err(LabelError::FetchFailed {
                                    key,
                                    reason: format!("timed out after {:?}", timeout),
                                }))
                            }
                        };
                        (key, result)
                    }
                })
                .buffer_unordered(fan_out)
                .for_each(|(key, result)| {
                    let _ = tx.send(FetchMessage::Tile {
                        batch: id,
                        key,
                        result,
                    });
                    futures::future::ready(())
                })
                .await;
            let _ = tx.send(FetchMessage::BatchDone { batch: id });
        });

        self.batch = Some(ActiveBatch {
            id,
            eligible,
            token,
            handle,
        });
        self.stats.batches_started += 1;
        id
    }

    /// Apply every completion received so far. Results from cancelled or
    /// superseded batches are dropped.
    pub fn poll(&mut self, sink: &mut dyn LabelSink) -> PollSummary {
        let mut summary = PollSummary::default();
        while let Ok(message) = self.rx.try_recv() {
            match message {
                FetchMessage::Tile { batch, key, result } => {
                    let Some(eligible) = self.batch_eligible(batch) else {
                        self.stats.stale_results += 1;
                        log::debug!("drop result for {} from stale batch {}", key, batch);
                        continue;
                    };
                    self.pending.remove(&key);
                    match result {
                        Ok(features) => {
                            summary.tiles_loaded += 1;
                            summary.labels_added += self.store(key, features, eligible, sink);
                            self.stats.tiles_loaded += 1;
                        }
                        Err(e) if e.is_cancellation() => {
                            log::debug!("tile {} cancelled", key);
                        }
                        Err(e) => {
                            summary.tiles_failed += 1;
                            self.stats.tiles_failed += 1;
                            log::warn!("tile {} failed: {}", key, e);
                        }
                    }
                }
                FetchMessage::BatchDone { batch } => {
                    if self.batch.as_ref().map(|b| b.id) != Some(batch) {
                        continue;
                    }
                    log::debug!("fetch batch {} finished", batch);
                    self.batch = None;
                    summary.batch_finished = true;
                    if let Some(request) = self.rerun.take() {
                        self.stats.reruns += 1;
                        self.request_tiles(request.keys, request.zoom, request.eligible, sink);
                    }
                }
            }
        }
        summary
    }

    fn batch_eligible(&self, batch: u64) -> Option<KindSet> {
        self.batch
            .as_ref()
            .filter(|b| b.id == batch)
            .map(|b| b.eligible)
    }

    /// Materialize the eligible features of a fetched tile. A tile that is
    /// already cached keeps its labels and gains only the kinds it lacked.
    fn store(
        &mut self,
        key: TileKey,
        features: Vec<LabelFeature>,
        eligible: KindSet,
        sink: &mut dyn LabelSink,
    ) -> usize {
        if let Some(tile) = self.cache.get_mut(&key) {
            let missing = eligible.difference(&tile.eligible);
            let before = tile.labels.len();
            tile.labels.extend(
                features
                    .into_iter()
                    .filter(|f| missing.contains(f.kind))
                    .map(|f| RenderableLabel::materialize(f, sink)),
            );
            tile.eligible = tile.eligible.union(&eligible);
            return tile.labels.len() - before;
        }

        let labels: Vec<RenderableLabel> = features
            .into_iter()
            .filter(|f| eligible.contains(f.kind))
            .map(|f| RenderableLabel::materialize(f, sink))
            .collect();
        let added = labels.len();
        if let Some((old_key, old)) = self.cache.push(key, CachedTile { eligible, labels }) {
            if old_key != key {
                self.stats.tiles_evicted += 1;
                log::debug!("evict tile {} over capacity", old_key);
            }
            destroy_all(old.labels, sink);
        }
        added
    }

    /// Evict everything and cancel in-flight work when the fetch zoom
    /// changes. Returns true if it did.
    pub fn on_zoom_changed(&mut self, zoom: u8, sink: &mut dyn LabelSink) -> bool {
        if self.current_zoom == Some(zoom) {
            return false;
        }
        log::info!("fetch zoom {:?} -> {}", self.current_zoom, zoom);
        self.reset(sink);
        self.current_zoom = Some(zoom);
        true
    }

    /// Evict everything, cancel in-flight work and forget the fetch zoom.
    pub fn clear(&mut self, sink: &mut dyn LabelSink) {
        self.reset(sink);
        self.current_zoom = None;
    }

    fn reset(&mut self, sink: &mut dyn LabelSink) {
        self.cancel_batch();
        self.pending.clear();
        self.rerun = None;
        let evicted = self.evict_all(sink);
        if evicted > 0 {
            log::debug!("evicted {} cached tiles", evicted);
        }
    }

    fn cancel_batch(&mut self) {
        if let Some(batch) = self.batch.take() {
            log::debug!("cancel fetch batch {}", batch.id);
            batch.token.cancel();
            batch.handle.cancel();
            self.stats.batches_cancelled += 1;
        }
    }

    fn evict_all(&mut self, sink: &mut dyn LabelSink) -> usize {
        let mut evicted = 0;
        while let Some((_, tile)) = self.cache.pop_lru() {
            destroy_all(tile.labels, sink);
            evicted += 1;
        }
        self.stats.tiles_evicted += evicted as u64;
        evicted
    }
}

fn destroy_all(labels: Vec<RenderableLabel>, sink: &mut dyn LabelSink) {
    for label in labels {
        label.destroy(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{LabelKind, MemorySink};
    use crate::tiles::StaticTileFetcher;
    use std::time::Duration;

    fn key(x: u32, y: u32) -> TileKey {
        TileKey::new(5, x, y)
    }

    fn fetcher_with_tiles() -> StaticTileFetcher {
        let fetcher = StaticTileFetcher::new();
        fetcher.add(key(1, 1), LabelFeature::new(1.0, 1.0, "Alpha", LabelKind::Country));
        fetcher.add(key(1, 1), LabelFeature::new(1.0, 1.0, "Alphaville", LabelKind::CitySmall));
        fetcher.add(key(2, 1), LabelFeature::new(2.0, 1.0, "Beta", LabelKind::State));
        fetcher
    }

    async fn drain(coordinator: &mut FetchCoordinator, sink: &mut MemorySink) -> PollSummary {
        let mut total = PollSummary::default();
        for _ in 0..200 {
            let s = coordinator.poll(sink);
            total.tiles_loaded += s.tiles_loaded;
            total.labels_added += s.labels_added;
            total.tiles_failed += s.tiles_failed;
            total.batch_finished |= s.batch_finished;
            if !coordinator.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        total
    }

    #[tokio::test]
    async fn test_fetch_filters_to_eligible_and_materializes_hidden() {
        let fetcher = fetcher_with_tiles();
        let mut coordinator = FetchCoordinator::new(Arc::new(fetcher), FetchConfig::default());
        let mut sink = MemorySink::new();
        let eligible = KindSet::from_kinds(&[LabelKind::Country, LabelKind::State]);

        let outcome = coordinator.request_tiles(vec![key(1, 1), key(2, 1)], 5, eligible, &mut sink);
        assert_eq!(outcome, RequestOutcome::Started { batch: 1, tiles: 2 });
        assert_eq!(coordinator.pending_count(), 2);

        let summary = drain(&mut coordinator, &mut sink).await;
        assert_eq!(summary.tiles_loaded, 2);
        assert_eq!(summary.labels_added, 2);
        assert_eq!(coordinator.pending_count(), 0);
        assert_eq!(coordinator.cached_keys(), vec![key(1, 1), key(2, 1)]);
        assert!(sink.find_by_name("Alphaville").is_empty());
        let alpha = &sink.find_by_name("Alpha")[0];
        assert!(!alpha.visible);
        assert_eq!(alpha.opacity, 0.0);
    }

    #[tokio::test]
    async fn test_overlapping_requests_fetch_once() {
        let fetcher = fetcher_with_tiles().with_latency(Duration::from_millis(20));
        let mut coordinator =
            FetchCoordinator::new(Arc::new(fetcher.clone()), FetchConfig::default());
        let mut sink = MemorySink::new();
        let eligible = KindSet::all();

        coordinator.request_tiles(vec![key(1, 1)], 5, eligible, &mut sink);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = coordinator.request_tiles(vec![key(1, 1)], 5, eligible, &mut sink);
        assert_eq!(second, RequestOutcome::Coalesced);
        assert!(coordinator.has_rerun());

        drain(&mut coordinator, &mut sink).await;
        assert!(!coordinator.has_rerun());
        assert_eq!(fetcher.fetch_count(key(1, 1)), 1);
    }

    #[tokio::test]
    async fn test_rerun_fetches_new_keys_after_batch() {
        let fetcher = fetcher_with_tiles().with_latency(Duration::from_millis(10));
        let mut coordinator =
            FetchCoordinator::new(Arc::new(fetcher.clone()), FetchConfig::default());
        let mut sink = MemorySink::new();

        coordinator.request_tiles(vec![key(1, 1)], 5, KindSet::all(), &mut sink);
        coordinator.request_tiles(vec![key(3, 3)], 5, KindSet::all(), &mut sink);
        coordinator.request_tiles(vec![key(2, 1)], 5, KindSet::all(), &mut sink);

        drain(&mut coordinator, &mut sink).await;
        drain(&mut coordinator, &mut sink).await;
        assert_eq!(fetcher.fetched_keys(), vec![key(1, 1), key(2, 1)]);
        assert_eq!(coordinator.stats().reruns, 1);
    }

    #[tokio::test]
    async fn test_zoom_change_evicts_and_cancels() {
        let fetcher = fetcher_with_tiles().with_latency(Duration::from_millis(5));
        let mut coordinator =
            FetchCoordinator::new(Arc::new(fetcher.clone()), FetchConfig::default());
        let mut sink = MemorySink::new();

        coordinator.request_tiles(vec![key(1, 1), key(2, 1)], 5, KindSet::all(), &mut sink);
        drain(&mut coordinator, &mut sink).await;
        assert_eq!(sink.live_count(), 3);

        let slow = StaticTileFetcher::new().with_latency(Duration::from_millis(50));
        coordinator.fetcher = Arc::new(slow);
        coordinator.request_tiles(vec![TileKey::new(6, 2, 2)], 6, KindSet::all(), &mut sink);
        assert_eq!(sink.live_count(), 0);
        assert_eq!(sink.destroyed_count(), 3);
        assert_eq!(coordinator.cached_tile_count(), 0);
        assert!(coordinator.is_pending(&TileKey::new(6, 2, 2)));

        assert!(coordinator.on_zoom_changed(7, &mut sink));
        assert_eq!(coordinator.pending_count(), 0);
        assert!(!coordinator.is_busy());
        assert_eq!(coordinator.stats().batches_cancelled, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        coordinator.poll(&mut sink);
        assert_eq!(coordinator.cached_tile_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_tile_stays_uncached_and_retries() {
        let fetcher = fetcher_with_tiles();
        fetcher.fail(key(1, 1));
        let mut coordinator =
            FetchCoordinator::new(Arc::new(fetcher.clone()), FetchConfig::default());
        let mut sink = MemorySink::new();

        coordinator.request_tiles(vec![key(1, 1), key(2, 1)], 5, KindSet::all(), &mut sink);
        let summary = drain(&mut coordinator, &mut sink).await;
        assert_eq!(summary.tiles_failed, 1);
        assert_eq!(summary.tiles_loaded, 1);
        assert!(!coordinator.contains(&key(1, 1)));
        assert!(!coordinator.is_pending(&key(1, 1)));

        fetcher.heal(key(1, 1));
        coordinator.request_tiles(vec![key(1, 1), key(2, 1)], 5, KindSet::all(), &mut sink);
        drain(&mut coordinator, &mut sink).await;
        assert!(coordinator.contains(&key(1, 1)));
        assert_eq!(fetcher.fetch_count(key(2, 1)), 1);
    }

    #[tokio::test]
    async fn test_timed_out_tile_fails_alone() {
        let fetcher = fetcher_with_tiles();
        fetcher.stall(key(1, 1), Duration::from_millis(100));
        let config = FetchConfig {
            request_timeout_ms: 10,
            ..FetchConfig::default()
        };
        let mut coordinator = FetchCoordinator::new(Arc::new(fetcher), config);
        let mut sink = MemorySink::new();

        coordinator.request_tiles(vec![key(1, 1), key(2, 1)], 5, KindSet::all(), &mut sink);
        let summary = drain(&mut coordinator, &mut sink).await;
        assert!(summary.batch_finished);
        assert_eq!(summary.tiles_failed, 1);
        assert_eq!(coordinator.stats().tiles_failed, 1);
        assert!(!coordinator.contains(&key(1, 1)));
        assert!(!coordinator.is_pending(&key(1, 1)));
        assert!(coordinator.contains(&key(2, 1)));
        assert_eq!(sink.find_by_name("Beta").len(), 1);
    }

    #[tokio::test]
    async fn test_widened_eligible_set_adds_missing_kinds() {
        let fetcher = fetcher_with_tiles();
        let mut coordinator =
            FetchCoordinator::new(Arc::new(fetcher.clone()), FetchConfig::default());
        let mut sink = MemorySink::new();
        let narrow = KindSet::from_kinds(&[LabelKind::Country, LabelKind::State]);
        let wide = narrow.with(LabelKind::CitySmall);

        coordinator.request_tiles(vec![key(1, 1)], 5, narrow, &mut sink);
        drain(&mut coordinator, &mut sink).await;
        assert_eq!(sink.created_count(), 1);
        assert!(sink.find_by_name("Alphaville").is_empty());

        let outcome = coordinator.request_tiles(vec![key(1, 1)], 5, wide, &mut sink);
        assert!(matches!(outcome, RequestOutcome::Started { tiles: 1, .. }));
        let summary = drain(&mut coordinator, &mut sink).await;
        assert_eq!(summary.labels_added, 1);
        assert_eq!(sink.find_by_name("Alphaville").len(), 1);
        // the label already cached survives untouched
        assert_eq!(sink.created_count(), 2);
        assert_eq!(sink.destroyed_count(), 0);
        assert_eq!(coordinator.labels(&key(1, 1)).map(<[_]>::len), Some(2));

        // narrowing again needs nothing new
        let outcome = coordinator.request_tiles(vec![key(1, 1)], 5, narrow, &mut sink);
        assert_eq!(outcome, RequestOutcome::NothingToFetch);
        assert_eq!(fetcher.fetch_count(key(1, 1)), 2);
    }

    #[tokio::test]
    async fn test_capacity_eviction_destroys_labels() {
        let fetcher = fetcher_with_tiles();
        let config = FetchConfig {
            cache_capacity: 1,
            ..FetchConfig::default()
        };
        let mut coordinator = FetchCoordinator::new(Arc::new(fetcher), config);
        let mut sink = MemorySink::new();

        coordinator.request_tiles(vec![key(1, 1), key(2, 1)], 5, KindSet::all(), &mut sink);
        drain(&mut coordinator, &mut sink).await;
        assert_eq!(coordinator.cached_tile_count(), 1);
        assert_eq!(sink.live_count(), coordinator.cached_label_count());
        assert_eq!(coordinator.stats().tiles_evicted, 1);
    }

    #[tokio::test]
    async fn test_clear_forgets_zoom() {
        let mut coordinator =
            FetchCoordinator::new(Arc::new(fetcher_with_tiles()), FetchConfig::default());
        let mut sink = MemorySink::new();
        coordinator.request_tiles(vec![key(2, 1)], 5, KindSet::all(), &mut sink);
        drain(&mut coordinator, &mut sink).await;

        coordinator.clear(&mut sink);
        assert_eq!(coordinator.current_zoom(), None);
        assert_eq!(coordinator.cached_tile_count(), 0);
        assert_eq!(sink.live_count(), 0);
    }
}
