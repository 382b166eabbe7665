//! Property-based tests for tile coverage, placement, tiers and fades.
//!
//! These check invariants over a wide range of generated inputs using proptest.

mod common;

use geolabel::labels::Candidate;
use geolabel::prelude::*;
use geolabel::tiles::{lat_to_tile_y, lon_to_tile_x, nearest_tile_keys, tile_keys_for_view};
use proptest::prelude::*;

fn containing_tile(lng: f64, lat: f64, zoom: u8) -> TileKey {
    TileKey::new(zoom, lon_to_tile_x(lng, zoom), lat_to_tile_y(lat, zoom))
}

fn wrap(lng: f64) -> f64 {
    if lng > 180.0 {
        lng - 360.0
    } else {
        lng
    }
}

const KINDS: [LabelKind; 6] = LabelKind::ALL;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every sampled point of the view, seam included, lies in a returned tile
    #[test]
    fn prop_tiles_cover_view(
        west in -180.0f64..180.0,
        width in 0.01f64..40.0,
        south in -80.0f64..40.0,
        height in 0.01f64..40.0,
        zoom in 2u8..=8,
    ) {
        let east = wrap(west + width);
        let north = (south + height).min(85.0);
        let rect = ViewRectangle::new(west, east, south, north);
        let coverage = tile_keys_for_view(&rect, zoom);
        prop_assert!(coverage.keys.iter().all(|k| k.z == zoom && k.is_valid()));

        for i in 0..=8 {
            for j in 0..=8 {
                let lng = wrap(west + width * i as f64 / 8.0);
                let lat = south + (north - south) * j as f64 / 8.0;
                let key = containing_tile(lng, lat, zoom);
                prop_assert!(coverage.keys.contains(&key), "{} missing for ({}, {})", key, lng, lat);
            }
        }
    }

    /// The bounded nearest-tile search agrees with ranking the full coverage
    #[test]
    fn prop_nearest_keys_match_full_ranking(
        west in -180.0f64..180.0,
        width in 0.01f64..120.0,
        south in -85.0f64..40.0,
        height in 0.01f64..60.0,
        zoom in 2u8..=7,
        cap in 1usize..96,
    ) {
        let east = wrap(west + width);
        let north = (south + height).min(85.0);
        let rect = ViewRectangle::new(west, east, south, north);
        prop_assert_eq!(
            nearest_tile_keys(&rect, zoom, cap),
            tile_keys_for_view(&rect, zoom).prioritized(cap)
        );
    }

    /// No two accepted boxes overlap, whatever the cluster looks like
    #[test]
    fn prop_accepted_boxes_never_overlap(
        labels in prop::collection::vec(
            (0.0f64..10.0, 40.0f64..50.0, 0usize..6, 1usize..14),
            1..80,
        ),
        zoom in 2.0f64..13.0,
        cell in 16.0f64..128.0,
    ) {
        let viewport = StaticViewport::new(
            1_000_000.0,
            Some(ViewRectangle::new(0.0, 10.0, 40.0, 50.0)),
            ScreenSize::new(1000.0, 800.0),
        );
        let features: Vec<LabelFeature> = labels
            .iter()
            .map(|(lng, lat, kind, len)| {
                LabelFeature::new(*lng, *lat, "x".repeat(*len), KINDS[*kind])
            })
            .collect();
        let candidates: Vec<Candidate<'_>> = features
            .iter()
            .enumerate()
            .map(|(i, f)| Candidate::new(LabelHandle(i as u64), f))
            .collect();
        let resolver = PlacementResolver::new(PlacementConfig {
            cell_size_px: cell,
            ..PlacementConfig::default()
        });
        let tier = tier_for(zoom);
        let outcome = resolver.resolve(&candidates, &tier, &viewport);

        for (i, a) in outcome.accepted.iter().enumerate() {
            for b in &outcome.accepted[i + 1..] {
                prop_assert!(!a.screen_box.intersects(&b.screen_box));
            }
        }
        // every candidate gets exactly one verdict
        prop_assert_eq!(outcome.accepted.len() + outcome.rejected.len(), candidates.len());
        for placed in &outcome.accepted {
            let kind = features[placed.handle.0 as usize].kind;
            prop_assert!(tier.eligible.contains(kind));
        }
    }

    /// Eligible kinds always include display kinds
    #[test]
    fn prop_eligible_superset_of_display(zoom in -5.0f64..25.0) {
        let tier = tier_for(zoom);
        prop_assert!(tier.eligible.is_superset_of(&tier.display));
        prop_assert!(!tier.display.is_empty());
    }

    /// Integer fetch zoom and continuous display zoom never disagree
    #[test]
    fn prop_zoom_tables_agree(height in 1_000.0f64..60_000_000.0) {
        let stepped = height_to_zoom(height);
        let smooth = height_to_zoom_float(height);
        prop_assert_eq!(stepped, smooth.floor() as u8);
    }

    /// Fades converge on their target at any frame rate and only hide once
    /// fully faded out
    #[test]
    fn prop_fade_converges(
        targets in prop::collection::vec(prop::bool::ANY, 1..6),
        frame_ms in 1u64..100,
    ) {
        let driver = FadeDriver::default();
        let mut sink = MemorySink::new();
        let mut label = RenderableLabel::materialize(
            LabelFeature::new(0.0, 0.0, "Null Island", LabelKind::CitySmall),
            &mut sink,
        );
        for show in targets {
            let target = if show { 1.0 } else { 0.0 };
            label.retarget(target, &mut sink);
            let mut ticks = 0;
            while driver.tick(std::iter::once(&mut label), Duration::from_millis(frame_ms), &mut sink) > 0 {
                ticks += 1;
                prop_assert!(ticks < 1_000);
                if !label.is_visible() {
                    prop_assert!(target == 0.0 && label.current_opacity() == 0.0);
                }
            }
            prop_assert!((label.current_opacity() - target).abs() < 1e-6);
            prop_assert_eq!(label.is_visible(), show);
        }
    }
}

/// After a zoom change nothing from the old zoom is cached or pending
#[tokio::test]
async fn test_zoom_eviction_leaves_nothing_behind() {
    common::init_logging();
    let fetcher = StaticTileFetcher::from_features(&common::gazetteer(), 2..=13)
        .with_latency(Duration::from_millis(5));
    let mut coordinator = FetchCoordinator::new(Arc::new(fetcher), FetchConfig::default());
    let mut sink = MemorySink::new();

    for (from, to) in [(10u8, 11u8), (11, 5), (5, 13)] {
        let keys = nearest_tile_keys(&common::france(), from, 64);
        coordinator.request_tiles(keys, from, KindSet::all(), &mut sink);
        tokio::time::sleep(Duration::from_millis(8)).await;
        coordinator.poll(&mut sink);

        assert!(coordinator.on_zoom_changed(to, &mut sink));
        assert!(coordinator.cached_keys().iter().all(|k| k.z != from));
        assert_eq!(coordinator.pending_count(), 0);
        assert_eq!(sink.live_count(), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.poll(&mut sink);
        assert_eq!(coordinator.cached_tile_count(), 0);
    }
}
