//! # Trail Navigator
//!
//! Track geometry and live-progress engine for following a GPX route on the trail.
//!
//! This library provides:
//! - GPX parsing into a [`Track`] with distance and noise-filtered elevation totals
//! - Remaining distance/elevation estimation against a reference track
//! - A live session tracker fed by an external position sensor
//! - GPX export of a recorded session
//!
//! ## Features
//!
//! - **`serde`** - Serialize/deserialize tracks, points and metrics
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trail_navigator::{parse_track, compute_remaining, GpsPoint};
//!
//! let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
//! <gpx version="1.1" creator="example">
//!   <trk>
//!     <name>Col de Balme</name>
//!     <trkseg>
//!       <trkpt lat="45.9901" lon="6.9271"><ele>1460</ele></trkpt>
//!       <trkpt lat="45.9950" lon="6.9300"><ele>1620</ele></trkpt>
//!       <trkpt lat="46.0010" lon="6.9320"><ele>2190</ele></trkpt>
//!     </trkseg>
//!   </trk>
//! </gpx>"#;
//!
//! let track = parse_track(gpx).unwrap();
//! assert_eq!(track.name(), "Col de Balme");
//! assert_eq!(track.points().len(), 3);
//! assert_eq!(track.elevation_gain_m(), 730.0);
//!
//! let remaining = compute_remaining(&GpsPoint::new(45.9951, 6.9301), track.points());
//! assert_eq!(remaining.elevation_m, 570.0);
//! ```

use chrono::{DateTime, Utc};
use geo::{Coord, LineString, Point};
use thiserror::Error;

pub mod geo_utils;

// GPX parsing and export
pub mod gpx;
pub use gpx::{parse_track, parse_track_with_config};

pub mod export;
pub use export::{export_track, export_track_with_config, gpx_filename, write_track, ExportConfig};

// Remaining distance/elevation along a reference track
pub mod progress;
pub use progress::{compute_remaining, find_nearest_index, Remaining};

// External position sensor plumbing
pub mod sensor;
pub use sensor::{
    sensor_channel, ChannelSource, PositionSample, PositionSource, SensorError, SensorEvent,
    SensorFeed, Subscription,
};

// Live session recording
pub mod live;
pub use live::{Clock, LiveMetrics, LiveTracker, SystemClock, TrackerState};

// Display-layer facade
pub mod navigator;
pub use navigator::{MapRenderer, Navigator};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrailNavigatorRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use trail_navigator::GpsPoint;
/// let point = GpsPoint::new(45.8326, 6.8652); // Mont Blanc
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

impl From<Point<f64>> for GpsPoint {
    fn from(point: Point<f64>) -> Self {
        Self::new(point.y(), point.x())
    }
}

impl From<GpsPoint> for Point<f64> {
    fn from(point: GpsPoint) -> Self {
        Point::new(point.longitude, point.latitude)
    }
}

/// A single point of a track: position plus optional elevation and time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level
    pub elevation: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            timestamp: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Haversine distance to another point in meters.
    #[inline]
    pub fn distance_to(&self, other: &TrackPoint) -> f64 {
        geo_utils::haversine_distance(&self.position(), &other.position())
    }
}

/// Bounding box of a track, used to fit the map view.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from track points.
    pub fn from_points(points: &[TrackPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Grow the box by `meters` on every side.
    pub fn padded(&self, meters: f64) -> Self {
        let pad = geo_utils::meters_to_degrees(meters, self.center().latitude);
        Self {
            min_lat: self.min_lat - pad,
            max_lat: self.max_lat + pad,
            min_lng: self.min_lng - pad,
            max_lng: self.max_lng + pad,
        }
    }

    pub fn contains(&self, point: &GpsPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

/// Configuration for building a [`Track`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackConfig {
    /// Elevation changes are buffered until they exceed this many meters.
    /// Default: 3.0 meters
    pub elevation_threshold: f64,

    /// Name used when the document has no track name.
    /// Default: "Unnamed Track"
    pub default_name: String,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            elevation_threshold: 3.0,
            default_name: "Unnamed Track".to_string(),
        }
    }
}

/// A named route with its aggregate metrics.
///
/// Metrics are computed once on construction; the track is read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    name: String,
    points: Vec<TrackPoint>,
    /// Kilometers, 2 decimals
    distance: f64,
    /// Whole meters
    elevation_gain: f64,
    /// Whole meters
    elevation_loss: f64,
}

impl Track {
    /// Build a track and compute its distance and filtered elevation totals.
    ///
    /// # Example
    /// ```
    /// use trail_navigator::{Track, TrackConfig, TrackPoint};
    ///
    /// let track = Track::from_points("Loop", vec![TrackPoint::new(45.0, 6.0)], &TrackConfig::default());
    /// assert_eq!(track.distance_km(), 0.0);
    /// ```
    pub fn from_points(name: impl Into<String>, points: Vec<TrackPoint>, config: &TrackConfig) -> Self {
        let distance_m = geo_utils::polyline_length(&points);
        let elevation = geo_utils::filtered_elevation(&points, config.elevation_threshold);

        Self {
            name: name.into(),
            distance: geo_utils::round_to(distance_m / 1000.0, 2),
            elevation_gain: elevation.gain.round(),
            elevation_loss: elevation.loss.round(),
            points,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn distance_km(&self) -> f64 {
        self.distance
    }

    pub fn elevation_gain_m(&self) -> f64 {
        self.elevation_gain
    }

    pub fn elevation_loss_m(&self) -> f64 {
        self.elevation_loss
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.points)
    }

    pub fn center(&self) -> GpsPoint {
        geo_utils::compute_center(&self.points)
    }

    /// Track geometry as a line string (x = longitude, y = latitude) for renderers.
    pub fn to_line_string(&self) -> LineString<f64> {
        self.points
            .iter()
            .map(|p| Coord { x: p.longitude, y: p.latitude })
            .collect()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a GPX document could not be read.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("document has no root element")]
    Empty,
    #[error("expected a <gpx> root element, found <{0}>")]
    UnexpectedRoot(String),
    #[error("content outside the root element")]
    TrailingContent,
    #[error("element <{0}> is never closed")]
    Unclosed(String),
}

/// Why a set of points could not be exported.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot export a track with no points")]
    NoPoints,
    #[error("failed to write GPX output: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{debug, info};
    use std::sync::{Arc, Mutex, MutexGuard};

    /// Error surfaced to Kotlin/Swift.
    #[derive(Debug, Error, uniffi::Error)]
    #[uniffi(flat_error)]
    pub enum NavigatorError {
        #[error("{0}")]
        Parse(String),
        #[error("{0}")]
        Export(String),
    }

    impl From<ParseError> for NavigatorError {
        fn from(err: ParseError) -> Self {
            NavigatorError::Parse(err.to_string())
        }
    }

    impl From<ExportError> for NavigatorError {
        fn from(err: ExportError) -> Self {
            NavigatorError::Export(err.to_string())
        }
    }

    /// Flat track point for mobile: timestamps as Unix milliseconds.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FlatTrackPoint {
        pub latitude: f64,
        pub longitude: f64,
        pub elevation: Option<f64>,
        pub timestamp_ms: Option<i64>,
    }

    impl From<&TrackPoint> for FlatTrackPoint {
        fn from(p: &TrackPoint) -> Self {
            Self {
                latitude: p.latitude,
                longitude: p.longitude,
                elevation: p.elevation,
                timestamp_ms: p.timestamp.map(|t| t.timestamp_millis()),
            }
        }
    }

    impl From<FlatTrackPoint> for TrackPoint {
        fn from(p: FlatTrackPoint) -> Self {
            Self {
                latitude: p.latitude,
                longitude: p.longitude,
                elevation: p.elevation,
                timestamp: p.timestamp_ms.and_then(DateTime::from_timestamp_millis),
            }
        }
    }

    /// Parsed track with metrics, flattened for mobile.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FlatTrack {
        pub name: String,
        pub points: Vec<FlatTrackPoint>,
        pub distance_km: f64,
        pub elevation_gain_m: f64,
        pub elevation_loss_m: f64,
        pub bounds: Option<Bounds>,
    }

    impl From<&Track> for FlatTrack {
        fn from(track: &Track) -> Self {
            Self {
                name: track.name().to_string(),
                points: track.points().iter().map(FlatTrackPoint::from).collect(),
                distance_km: track.distance_km(),
                elevation_gain_m: track.elevation_gain_m(),
                elevation_loss_m: track.elevation_loss_m(),
                bounds: track.bounds(),
            }
        }
    }

    /// Position fix pushed from the platform location API.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FlatPositionSample {
        pub latitude: f64,
        pub longitude: f64,
        pub altitude: Option<f64>,
        pub timestamp_ms: i64,
    }

    /// Parse a GPX document.
    #[uniffi::export]
    pub fn parse_gpx(document: String) -> Result<FlatTrack, NavigatorError> {
        init_logging();
        let track = parse_track(&document)?;
        info!(
            "[TrailNavigatorRust] parsed '{}': {} points, {:.2}km",
            track.name(),
            track.points().len(),
            track.distance_km()
        );
        Ok(FlatTrack::from(&track))
    }

    /// Parse a GPX document with custom configuration.
    #[uniffi::export]
    pub fn parse_gpx_with_config(document: String, config: TrackConfig) -> Result<FlatTrack, NavigatorError> {
        init_logging();
        let track = parse_track_with_config(&document, &config)?;
        Ok(FlatTrack::from(&track))
    }

    /// Get default track configuration.
    #[uniffi::export]
    pub fn default_track_config() -> TrackConfig {
        TrackConfig::default()
    }

    /// Distance and climb left from `position` to the end of `track`.
    #[uniffi::export]
    pub fn remaining_to_finish(position: GpsPoint, track: Vec<FlatTrackPoint>) -> Remaining {
        init_logging();
        let points: Vec<TrackPoint> = track.into_iter().map(TrackPoint::from).collect();
        compute_remaining(&position, &points)
    }

    /// Serialize points into a GPX document.
    #[uniffi::export]
    pub fn export_gpx(name: String, points: Vec<FlatTrackPoint>) -> Result<String, NavigatorError> {
        init_logging();
        let points: Vec<TrackPoint> = points.into_iter().map(TrackPoint::from).collect();
        Ok(export_track(&name, &points)?)
    }

    /// File name for an exported session.
    #[uniffi::export]
    pub fn gpx_file_name(base: String) -> String {
        gpx_filename(&base)
    }

    /// Live tracker driven by samples pushed from the host platform.
    ///
    /// The host owns the location subscription; it calls `start`, forwards every
    /// fix through `push_sample` and calls `stop` when it clears its watch.
    #[derive(uniffi::Object)]
    pub struct LiveTrackerHandle {
        inner: Mutex<LiveTracker>,
    }

    impl LiveTrackerHandle {
        fn tracker(&self) -> MutexGuard<'_, LiveTracker> {
            self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[uniffi::export]
    impl LiveTrackerHandle {
        #[uniffi::constructor]
        pub fn new() -> Arc<Self> {
            init_logging();
            Arc::new(Self {
                inner: Mutex::new(LiveTracker::new()),
            })
        }

        pub fn start(&self) {
            self.tracker().start();
        }

        /// Returns false when the tracker is not active or the timestamp is invalid.
        pub fn push_sample(&self, sample: FlatPositionSample) -> bool {
            let Some(timestamp) = DateTime::from_timestamp_millis(sample.timestamp_ms) else {
                debug!("[TrailNavigatorRust] dropping sample with bad timestamp {}", sample.timestamp_ms);
                return false;
            };
            self.tracker().on_sample(PositionSample {
                latitude: sample.latitude,
                longitude: sample.longitude,
                altitude: sample.altitude,
                timestamp,
            })
        }

        pub fn stop(&self) {
            self.tracker().stop();
        }

        pub fn metrics(&self) -> LiveMetrics {
            self.tracker().metrics()
        }

        pub fn recorded_points(&self) -> Vec<FlatTrackPoint> {
            self.tracker().points().iter().map(FlatTrackPoint::from).collect()
        }

        pub fn export(&self, name: String) -> Result<String, NavigatorError> {
            Ok(self.tracker().export(&name)?)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
