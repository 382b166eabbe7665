//! The composition root: wires the viewport, tile coordinator, placement,
//! fade and scheduling into one engine driven by viewer events and render
//! ticks.

use crate::animation::FadeDriver;
use crate::core::config::{LabelEngineOptions, LabelEngineProfile};
use crate::core::geo::TileKey;
use crate::core::viewport::{SubscriptionId, ViewerEvent, ViewportProvider};
use crate::labels::{
    height_to_zoom, height_to_zoom_float, tier_for, Candidate, LabelHandle, LabelSink,
    PlacementOutcome, PlacementResolver, Tier,
};
use crate::prelude::{Arc, HashMap, HashSet};
use crate::scheduler::Scheduler;
use crate::tiles::{nearest_tile_keys, CoordinatorStats, FetchCoordinator, RequestOutcome, TileFetcher};
use crate::{LabelError, Result};
use crossbeam_channel::Receiver;
use instant::Instant;

/// Point-in-time diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    pub enabled: bool,
    pub tiling_supported: bool,
    pub fetch_zoom: Option<u8>,
    pub active_tiles: usize,
    pub cached_tiles: usize,
    pub pending_tiles: usize,
    pub fetch_in_flight: bool,
    pub fetch_scheduled: bool,
    pub cached_labels: usize,
    pub visible_labels: usize,
    pub animating_labels: usize,
    pub last_accepted: usize,
    pub coordinator: CoordinatorStats,
}

struct Subscription {
    events: Receiver<ViewerEvent>,
    id: Option<SubscriptionId>,
}

pub struct LabelEngine {
    viewport: Arc<dyn ViewportProvider>,
    sink: Box<dyn LabelSink>,
    options: LabelEngineOptions,
    coordinator: FetchCoordinator,
    resolver: PlacementResolver,
    fade: FadeDriver,
    scheduler: Scheduler,
    active: HashSet<TileKey>,
    subscription: Option<Subscription>,
    enabled: bool,
    tiling_supported: bool,
    animating: usize,
    last_accepted: usize,
}

impl LabelEngine {
    pub fn new(
        viewport: Arc<dyn ViewportProvider>,
        fetcher: Arc<dyn TileFetcher>,
        sink: impl LabelSink + 'static,
        options: LabelEngineOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            viewport,
            sink: Box::new(sink),
            coordinator: FetchCoordinator::new(fetcher, options.fetch.clone()),
            resolver: PlacementResolver::new(options.placement.clone()),
            fade: FadeDriver::new(&options.fade),
            scheduler: Scheduler::new(options.scheduler.clone()),
            options,
            active: HashSet::default(),
            subscription: None,
            enabled: true,
            tiling_supported: true,
            animating: 0,
            last_accepted: 0,
        })
    }

    pub fn with_profile(
        viewport: Arc<dyn ViewportProvider>,
        fetcher: Arc<dyn TileFetcher>,
        sink: impl LabelSink + 'static,
        profile: LabelEngineProfile,
    ) -> Result<Self> {
        Self::new(viewport, fetcher, sink, profile.resolve())
    }

    /// Subscribe to viewer events and schedule the first fetch.
    pub fn init(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = self.viewport.subscribe(tx);
        if id.is_none() {
            log::debug!("viewport has no event feed, engine must be driven directly");
        }
        self.subscription = Some(Subscription { events: rx, id });
        self.scheduler.request_fetch();
        log::info!("label engine initialised");
    }

    /// Destroy every label, cancel fetches and unsubscribe.
    pub fn dispose(&mut self) {
        self.clear();
        if let Some(subscription) = self.subscription.take() {
            if let Some(id) = subscription.id {
                self.viewport.unsubscribe(id);
            }
        }
        log::info!("label engine disposed");
    }

    pub fn options(&self) -> &LabelEngineOptions {
        &self.options
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Labels are only maintained while enabled and the view supports tiling
    pub fn is_active(&self) -> bool {
        self.enabled && self.tiling_supported
    }

    pub fn active_keys(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self.active.iter().copied().collect();
        keys.sort();
        keys
    }

    /// Drain queued viewer events. Returns how many were handled.
    pub fn pump(&mut self, now: Instant) -> usize {
        let events: Vec<ViewerEvent> = match &self.subscription {
            Some(subscription) => subscription.events.try_iter().collect(),
            None => return 0,
        };
        for event in &events {
            match *event {
                ViewerEvent::CameraChanged => self.camera_changed(now),
                ViewerEvent::PreRender => self.frame(now),
                ViewerEvent::LabelsToggled(on) => self.set_enabled(on),
                ViewerEvent::TilingSupported(on) => self.set_tiling_supported(on),
            }
        }
        events.len()
    }

    pub fn camera_changed(&mut self, now: Instant) {
        if self.is_active() {
            self.scheduler.camera_changed(now);
        }
    }

    /// One render tick: apply finished fetches, run whatever passes are due,
    /// then advance fades by the wall-clock time since the previous tick.
    pub fn frame(&mut self, now: Instant) {
        if !self.is_active() {
            return;
        }
        let tick = self.scheduler.tick(now, self.viewport.camera_height());

        let polled = self.coordinator.poll(self.sink.as_mut());
        let mut place = tick.place || polled.labels_added > 0;

        if tick.fetch {
            match self.fetch_pass() {
                Ok(_) => place = true,
                Err(e) => log::debug!("fetch pass skipped: {}", e),
            }
        }

        if place {
            if let Err(e) = self.placement_pass() {
                log::debug!("placement pass skipped: {}", e);
            }
            self.scheduler.placement_ran(now);
        }

        self.animating = self.fade.tick(
            self.coordinator.labels_mut(),
            tick.frame_dt,
            self.sink.as_mut(),
        );
        if self.animating > 0 {
            self.sink.request_redraw();
        }
    }

    /// Resolve the fetch zoom and tile set for the current view and request
    /// whatever is missing. Without a ground rectangle nothing is touched.
    pub fn fetch_pass(&mut self) -> Result<RequestOutcome> {
        let rect = self
            .viewport
            .visible_rectangle()
            .ok_or(LabelError::NoViewRectangle)?;
        let height = self.viewport.camera_height();
        let zoom = height_to_zoom(height);
        let tier = tier_for(height_to_zoom_float(height));

        self.coordinator.on_zoom_changed(zoom, self.sink.as_mut());

        let cap = self.options.fetch.tile_cap(zoom);
        let keys = nearest_tile_keys(&rect, zoom, cap);
        self.active = keys.iter().copied().collect();
        for key in &keys {
            self.coordinator.promote(key);
        }

        let outcome =
            self.coordinator
                .request_tiles(keys, zoom, tier.eligible, self.sink.as_mut());
        log::debug!(
            "fetch pass at zoom {}: {} active tiles, {:?}",
            zoom,
            self.active.len(),
            outcome
        );
        Ok(outcome)
    }

    /// Recompute which cached labels should be shown and retarget every one
    /// of them. Candidates are gathered tile by tile in key order, so equal
    /// priority ties resolve the same way on every pass.
    pub fn placement_pass(&mut self) -> Result<PlacementOutcome> {
        if self.viewport.visible_rectangle().is_none() {
            return Err(LabelError::NoViewRectangle);
        }
        let tier = self.current_tier();

        let outcome = {
            let mut active_keys: Vec<&TileKey> = self.active.iter().collect();
            active_keys.sort();
            let candidates: Vec<Candidate<'_>> = active_keys
                .into_iter()
                .filter_map(|key| self.coordinator.labels(key))
                .flatten()
                .map(|label| Candidate::new(label.handle(), label.feature()))
                .collect();
            self.resolver
                .resolve(&candidates, &tier, self.viewport.as_ref())
        };

        let targets: HashMap<LabelHandle, f32> = outcome.targets().collect();
        for (key, labels) in self.coordinator.tiles_mut() {
            let active = self.active.contains(key);
            for label in labels.iter_mut() {
                let target = if active {
                    targets.get(&label.handle()).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
                label.retarget(target, self.sink.as_mut());
            }
        }

        self.last_accepted = outcome.accepted.len();
        self.sink.request_redraw();
        Ok(outcome)
    }

    pub fn current_tier(&self) -> Tier {
        tier_for(height_to_zoom_float(self.viewport.camera_height()))
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        log::info!("labels {}", if enabled { "enabled" } else { "disabled" });
        self.on_activity_changed();
    }

    pub fn set_tiling_supported(&mut self, supported: bool) {
        if self.tiling_supported == supported {
            return;
        }
        self.tiling_supported = supported;
        log::info!("tiled labels {}", if supported { "supported" } else { "unsupported" });
        self.on_activity_changed();
    }

    fn on_activity_changed(&mut self) {
        if self.is_active() {
            self.scheduler.request_fetch();
        } else {
            self.clear();
        }
    }

    /// Evict all tiles and cancel in-flight work.
    pub fn clear(&mut self) {
        self.coordinator.clear(self.sink.as_mut());
        self.active.clear();
        self.scheduler.reset();
        self.animating = 0;
        self.last_accepted = 0;
        self.sink.request_redraw();
    }

    pub fn stats(&self) -> EngineStats {
        let (cached_labels, visible_labels) = self
            .coordinator
            .cached_keys()
            .iter()
            .filter_map(|key| self.coordinator.labels(key))
            .flatten()
            .fold((0, 0), |(all, visible), label| {
                (all + 1, visible + usize::from(label.is_visible()))
            });
        EngineStats {
            enabled: self.enabled,
            tiling_supported: self.tiling_supported,
            fetch_zoom: self.coordinator.current_zoom(),
            active_tiles: self.active.len(),
            cached_tiles: self.coordinator.cached_tile_count(),
            pending_tiles: self.coordinator.pending_count(),
            fetch_in_flight: self.coordinator.is_busy(),
            fetch_scheduled: self.scheduler.fetch_scheduled(),
            cached_labels,
            visible_labels,
            animating_labels: self.animating,
            last_accepted: self.last_accepted,
            coordinator: self.coordinator.stats(),
        }
    }
}
