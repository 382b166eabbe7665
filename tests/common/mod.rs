//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use geolabel::prelude::*;
use instant::Instant;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn screen() -> ScreenSize {
    ScreenSize::new(1280.0, 720.0)
}

pub fn world() -> ViewRectangle {
    ViewRectangle::new(-180.0, 180.0, -60.0, 60.0)
}

pub fn france() -> ViewRectangle {
    ViewRectangle::new(1.0, 3.5, 48.0, 49.5)
}

/// A small gazetteer covering every label kind.
pub fn gazetteer() -> Vec<LabelFeature> {
    vec![
        LabelFeature::new(15.0, 50.0, "Europe", LabelKind::Continent),
        LabelFeature::new(20.0, 5.0, "Africa", LabelKind::Continent),
        LabelFeature::new(-100.0, 45.0, "North America", LabelKind::Continent),
        LabelFeature::new(2.5, 46.5, "France", LabelKind::Country),
        LabelFeature::new(10.0, 51.0, "Germany", LabelKind::Country),
        LabelFeature::new(2.5, 48.7, "Ile-de-France", LabelKind::State),
        LabelFeature::new(2.3522, 48.8566, "Paris", LabelKind::CityLarge),
        LabelFeature::new(2.1301, 48.8049, "Versailles", LabelKind::CityMedium),
        LabelFeature::new(2.2400, 48.8970, "Nanterre", LabelKind::CitySmall),
        LabelFeature::new(13.4050, 52.5200, "Berlin", LabelKind::CityLarge),
    ]
}

pub struct Harness {
    pub engine: LabelEngine,
    pub viewport: StaticViewport,
    pub sink: MemorySink,
    pub fetcher: StaticTileFetcher,
    pub now: Instant,
}

impl Harness {
    pub fn new(height: f64, rect: Option<ViewRectangle>, fetcher: StaticTileFetcher) -> Self {
        init_logging();
        let viewport = StaticViewport::new(height, rect, screen());
        let sink = MemorySink::new();
        let mut engine = LabelEngine::new(
            Arc::new(viewport.clone()),
            Arc::new(fetcher.clone()),
            sink.clone(),
            LabelEngineOptions::default(),
        )
        .expect("default options are valid");
        engine.init();
        Self {
            engine,
            viewport,
            sink,
            fetcher,
            now: Instant::now(),
        }
    }

    pub fn with_gazetteer(height: f64, rect: Option<ViewRectangle>) -> Self {
        Self::new(height, rect, StaticTileFetcher::from_features(&gazetteer(), 2..=13))
    }

    /// Advance one 16ms frame and give spawned fetches a chance to run.
    pub async fn frame(&mut self) {
        self.now += Duration::from_millis(16);
        self.engine.pump(self.now);
        self.engine.frame(self.now);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    pub async fn frames(&mut self, n: usize) {
        for _ in 0..n {
            self.frame().await;
        }
    }

    /// Run frames until no fetch is in flight and fades have settled.
    pub async fn settle(&mut self) {
        for _ in 0..200 {
            self.frame().await;
            let stats = self.engine.stats();
            if !stats.fetch_in_flight
                && !stats.fetch_scheduled
                && stats.pending_tiles == 0
                && stats.animating_labels == 0
            {
                break;
            }
        }
        self.frames(2).await;
    }

    pub fn move_camera(&mut self, height: f64, rect: Option<ViewRectangle>) {
        self.viewport.set_camera_height(height);
        self.viewport.set_rectangle(rect);
        self.viewport.emit(ViewerEvent::CameraChanged);
    }
}
