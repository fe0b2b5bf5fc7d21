//! Display-layer facade.
//!
//! [`Navigator`] holds the reference track and the live tracker, and pushes
//! geometry to a [`MapRenderer`] as things change. The display layer reads
//! everything else through its accessors.

use log::{info, warn};

use crate::live::{Clock, LiveMetrics, LiveTracker, SystemClock};
use crate::progress::{compute_remaining, Remaining};
use crate::sensor::{PositionSource, SensorError};
use crate::{gpx, Bounds, ExportError, GpsPoint, ParseError, Track, TrackConfig, TrackPoint};

/// Margin kept around a freshly loaded route when fitting the view.
const ROUTE_VIEW_PADDING_METERS: f64 = 50.0;

/// Whatever draws the map. Tiles, styling and camera are its business.
pub trait MapRenderer {
    /// Show a newly loaded reference route.
    fn load_route(&mut self, points: &[TrackPoint]);
    /// Frame the view on `bounds`.
    fn fit_bounds(&mut self, bounds: Bounds);
    /// Redraw the path recorded so far in the live session.
    fn update_live_path(&mut self, points: &[TrackPoint]);
    /// Move the "you are here" marker.
    fn place_marker(&mut self, position: GpsPoint);
}

/// Reference track, live session and map, wired together.
pub struct Navigator<R: MapRenderer, C: Clock = SystemClock> {
    config: TrackConfig,
    track: Option<Track>,
    tracker: LiveTracker<C>,
    renderer: R,
}

impl<R: MapRenderer> Navigator<R, SystemClock> {
    pub fn new(renderer: R) -> Self {
        Self::with_tracker(renderer, LiveTracker::new(), TrackConfig::default())
    }
}

impl<R: MapRenderer, C: Clock> Navigator<R, C> {
    pub fn with_tracker(renderer: R, tracker: LiveTracker<C>, config: TrackConfig) -> Self {
        Self {
            config,
            track: None,
            tracker,
            renderer,
        }
    }

    /// Parse `document` and make it the reference track.
    ///
    /// On error the current track, if any, is kept.
    pub fn load_track(&mut self, document: &str) -> Result<&Track, ParseError> {
        let track = gpx::parse_track_with_config(document, &self.config).map_err(|e| {
            warn!("Failed to load track: {}", e);
            e
        })?;

        let center = track.center();
        info!(
            "Track \"{}\" loaded: {} points, {:.2}km, centered at ({:.5}, {:.5})",
            track.name(),
            track.points().len(),
            track.distance_km(),
            center.latitude,
            center.longitude
        );
        self.renderer.load_route(track.points());
        if let Some(bounds) = track.bounds() {
            self.renderer.fit_bounds(bounds.padded(ROUTE_VIEW_PADDING_METERS));
        }
        Ok(self.track.insert(track))
    }

    /// Forget the reference track.
    pub fn clear_track(&mut self) {
        self.track = None;
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    /// Start a live session fed by `source`, replacing any previous one.
    pub fn start_tracking(&mut self, source: &mut dyn PositionSource) {
        self.tracker.start_watching(source);
    }

    pub fn stop_tracking(&mut self) {
        self.tracker.stop();
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_active()
    }

    /// Process queued sensor events and refresh the map if the path grew.
    ///
    /// The map is refreshed even when a sensor failure is returned, for the
    /// samples that came before it.
    pub fn pump(&mut self) -> Result<usize, SensorError> {
        let result = self.tracker.poll();

        if matches!(result, Ok(n) if n > 0) || result.is_err() {
            let points = self.tracker.points();
            if let Some(last) = points.last() {
                self.renderer.update_live_path(points);
                self.renderer.place_marker(last.position());
            }
        }

        result
    }

    /// What is left of the reference track from the last recorded position.
    ///
    /// `None` without a reference track or a recorded position.
    pub fn remaining(&self) -> Option<Remaining> {
        let track = self.track.as_ref()?;
        let last = self.tracker.last_point()?;
        Some(compute_remaining(&last.position(), track.points()))
    }

    /// What is left of the reference track from `position`; zero without a track.
    pub fn remaining_from(&self, position: &GpsPoint) -> Remaining {
        self.track
            .as_ref()
            .map(|t| compute_remaining(position, t.points()))
            .unwrap_or_default()
    }

    pub fn live_metrics(&self) -> LiveMetrics {
        self.tracker.metrics()
    }

    pub fn tracker(&self) -> &LiveTracker<C> {
        &self.tracker
    }

    /// Export the live session as a GPX document.
    pub fn export_session(&self, name: &str) -> Result<String, ExportError> {
        self.tracker.export(name)
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}
