//! Load a route, record a short simulated session along it and export it.
//!
//! Run with: cargo run --example live_session

use chrono::{Duration, Utc};
use trail_navigator::{
    gpx_filename, Bounds, ChannelSource, GpsPoint, MapRenderer, Navigator, PositionSample,
    SensorError, TrackPoint,
};

const ROUTE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="demo">
  <trk>
    <name>Lac Blanc</name>
    <trkseg>
      <trkpt lat="45.9701" lon="6.8920"><ele>2000</ele></trkpt>
      <trkpt lat="45.9720" lon="6.8905"><ele>2035</ele></trkpt>
      <trkpt lat="45.9745" lon="6.8890"><ele>2080</ele></trkpt>
      <trkpt lat="45.9790" lon="6.8875"><ele>2140</ele></trkpt>
      <trkpt lat="45.9812" lon="6.8868"><ele>2352</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

/// Prints what a real map would draw.
struct ConsoleMap;

impl MapRenderer for ConsoleMap {
    fn load_route(&mut self, points: &[TrackPoint]) {
        println!("[map] route with {} points", points.len());
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        println!(
            "[map] view ({:.4}, {:.4}) to ({:.4}, {:.4})",
            bounds.min_lat, bounds.min_lng, bounds.max_lat, bounds.max_lng
        );
    }

    fn update_live_path(&mut self, points: &[TrackPoint]) {
        println!("[map] live path now {} points", points.len());
    }

    fn place_marker(&mut self, position: GpsPoint) {
        println!("[map] marker at {:.5}, {:.5}", position.latitude, position.longitude);
    }
}

fn main() {
    let mut nav = Navigator::new(ConsoleMap);

    let track = match nav.load_track(ROUTE) {
        Ok(track) => track,
        Err(e) => {
            eprintln!("Failed to parse GPX file: {}", e);
            return;
        }
    };
    println!("Track \"{}\"", track.name());
    println!("  Distance:       {} km", track.distance_km());
    println!("  Elevation gain: {} m", track.elevation_gain_m());
    println!("  Elevation loss: {} m\n", track.elevation_loss_m());

    let mut source = ChannelSource::new();
    nav.start_tracking(&mut source);

    let Some(feed) = source.feed().cloned() else {
        return;
    };
    let start = Utc::now();
    let fixes = [
        (45.9702, 6.8919, Some(2001.0)),
        (45.9719, 6.8906, Some(2033.0)),
        (45.9744, 6.8891, None),
        (45.9788, 6.8876, Some(2138.0)),
    ];

    for (i, (lat, lon, alt)) in fixes.into_iter().enumerate() {
        if i == 2 {
            feed.fail(SensorError::Timeout);
        }
        feed.deliver(PositionSample {
            latitude: lat,
            longitude: lon,
            altitude: alt,
            timestamp: start + Duration::seconds(i as i64 * 90),
        });

        if let Err(e) = nav.pump() {
            eprintln!("Sensor error: {}", e);
        }

        let done = nav.live_metrics().rounded();
        if let Some(left) = nav.remaining() {
            println!(
                "  done {:.2} km, +{} m | left {:.2} km, +{} m",
                done.distance_km, done.elevation_gain_m, left.distance_km, left.elevation_m
            );
        }
    }

    nav.stop_tracking();

    match nav.export_session("Lac Blanc live") {
        Ok(gpx) => println!("\n{} ({} bytes)\n{}", gpx_filename("lac-blanc-live"), gpx.len(), gpx),
        Err(e) => eprintln!("Export failed: {}", e),
    }
}
