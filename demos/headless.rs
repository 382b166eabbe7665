use geolabel::prelude::*;
use instant::Instant;

/// Drive the label engine without any renderer: a static viewport flies from
/// a world view down to Paris while a memory sink records what would be drawn.
///
/// Pass a URL template (e.g. `https://labels.example.com/{z}/{x}/{y}.json`)
/// as the first argument to fetch over HTTP instead of the built-in gazetteer.
fn main() -> geolabel::Result<()> {
    env_logger::init();

    println!("geolabel headless example");
    println!("=========================");

    let fetcher: Arc<dyn TileFetcher> = match std::env::args().nth(1) {
        Some(template) => {
            println!("fetching tiles from {}", template);
            Arc::new(HttpTileFetcher::from_template(
                &template,
                Duration::from_secs(10),
            )?)
        }
        None => Arc::new(StaticTileFetcher::from_features(&gazetteer(), 2..=13)),
    };

    let viewport = StaticViewport::new(
        30_000_000.0,
        Some(ViewRectangle::new(-180.0, 180.0, -60.0, 60.0)),
        ScreenSize::new(1280.0, 720.0),
    );
    let sink = MemorySink::new();
    let mut engine = LabelEngine::with_profile(
        Arc::new(viewport.clone()),
        fetcher,
        sink.clone(),
        LabelEngineProfile::Balanced,
    )?;
    engine.init();

    let stops = [
        ("world", 30_000_000.0, ViewRectangle::new(-180.0, 180.0, -60.0, 60.0)),
        ("europe", 4_000_000.0, ViewRectangle::new(-10.0, 25.0, 36.0, 60.0)),
        ("france", 1_200_000.0, ViewRectangle::new(-4.0, 8.0, 42.0, 51.0)),
        ("paris", 100_000.0, ViewRectangle::new(1.8, 2.9, 48.6, 49.1)),
    ];

    let mut now = Instant::now();
    for (name, height, rect) in stops {
        viewport.set_camera_height(height);
        viewport.set_rectangle(Some(rect));
        viewport.emit(ViewerEvent::CameraChanged);

        // one simulated second at 60fps
        for _ in 0..60 {
            now += Duration::from_millis(16);
            viewport.emit(ViewerEvent::PreRender);
            engine.pump(now);
            std::thread::sleep(Duration::from_millis(2));
        }

        let stats = engine.stats();
        println!(
            "\n{} at {:.0} m: zoom {:?}, {} tiles cached, {} labels, {} visible",
            name,
            height,
            stats.fetch_zoom,
            stats.cached_tiles,
            stats.cached_labels,
            stats.visible_labels
        );
        for label in sink.visible_names() {
            println!("   {}", label);
        }
    }

    engine.dispose();
    println!("\ndisposed: {} labels left in the sink", sink.live_count());
    Ok(())
}

fn gazetteer() -> Vec<LabelFeature> {
    vec![
        LabelFeature::new(15.0, 50.0, "Europe", LabelKind::Continent),
        LabelFeature::new(20.0, 5.0, "Africa", LabelKind::Continent),
        LabelFeature::new(90.0, 45.0, "Asia", LabelKind::Continent),
        LabelFeature::new(2.5, 46.5, "France", LabelKind::Country),
        LabelFeature::new(10.0, 51.0, "Germany", LabelKind::Country),
        LabelFeature::new(-3.7, 40.2, "Spain", LabelKind::Country),
        LabelFeature::new(2.5, 48.7, "Ile-de-France", LabelKind::State),
        LabelFeature::new(4.8, 45.7, "Auvergne-Rhone-Alpes", LabelKind::State),
        LabelFeature::new(2.3522, 48.8566, "Paris", LabelKind::CityLarge),
        LabelFeature::new(4.8357, 45.7640, "Lyon", LabelKind::CityLarge),
        LabelFeature::new(5.3698, 43.2965, "Marseille", LabelKind::CityLarge),
        LabelFeature::new(2.1301, 48.8049, "Versailles", LabelKind::CityMedium),
        LabelFeature::new(2.2400, 48.8970, "Nanterre", LabelKind::CitySmall),
        LabelFeature::new(2.4400, 48.8600, "Montreuil", LabelKind::CitySmall),
    ]
}
