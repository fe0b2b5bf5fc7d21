//! # Geographic Utilities
//!
//! Core geographic computation utilities for GPS track analysis.
//!
//! This module provides the geodesy used by the parser, the progress estimator and
//! the live tracker. All functions are pure and work on WGS84 degrees.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a sequence of track points in meters |
//! | [`filtered_elevation`] | Elevation gain/loss with a noise threshold |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//! | [`compute_center`] | Centroid of a GPS track |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`round_to`] | Round to a number of decimals, half away from zero |
//!
//! ## Example
//!
//! ```rust
//! use trail_navigator::{GpsPoint, geo_utils};
//!
//! let chamonix = GpsPoint::new(45.9237, 6.8694);
//! let aiguille = GpsPoint::new(45.8787, 6.8874);
//!
//! let dist = geo_utils::haversine_distance(&chamonix, &aiguille);
//! println!("Straight line: {:.0}m", dist);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! The haversine formula calculates the great-circle distance between two points on a sphere.
//! The `atan2` form is used because it stays stable for both tiny and near-antipodal
//! separations.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use crate::{Bounds, GpsPoint, TrackPoint};

/// Mean Earth radius in meters used for every distance in this crate.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface, assuming a spherical Earth
/// with radius [`EARTH_RADIUS_METERS`]. No range validation is done on the inputs.
///
/// # Example
///
/// ```rust
/// use trail_navigator::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let phi1 = p1.latitude.to_radians();
    let phi2 = p2.latitude.to_radians();
    let d_phi = (p2.latitude - p1.latitude).to_radians();
    let d_lambda = (p2.longitude - p1.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` just past 1 near antipodal points
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Calculate the total length of a sequence of track points in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length(points: &[TrackPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| w[0].distance_to(&w[1]))
        .sum()
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Handy for padding a bounding box before fitting the map view to a route.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    // At the equator, 1 degree ≈ 111,320 meters, shrinking with cos(latitude)
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

/// Round `value` to `decimals` decimal places, half away from zero.
///
/// ```rust
/// use trail_navigator::geo_utils::round_to;
///
/// assert_eq!(round_to(12.345, 1), 12.3);
/// assert_eq!(round_to(2.5, 0), 3.0);
/// ```
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// =============================================================================
// Elevation Functions
// =============================================================================

/// Elevation gain and loss in meters, unrounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElevationTotals {
    pub gain: f64,
    pub loss: f64,
}

/// Accumulates elevation changes and only commits them once they exceed a threshold.
///
/// Small fluctuations build up in a signed residue. When the residue rises above
/// `+threshold` all of it is committed to gain; below `-threshold` its magnitude is
/// committed to loss. Either way the residue restarts at zero.
#[derive(Debug, Clone)]
pub struct ElevationAccumulator {
    threshold: f64,
    residue: f64,
    totals: ElevationTotals,
}

impl ElevationAccumulator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            residue: 0.0,
            totals: ElevationTotals::default(),
        }
    }

    /// Feed the elevation difference between two consecutive points.
    pub fn push(&mut self, delta: f64) {
        self.residue += delta;

        if self.residue > self.threshold {
            self.totals.gain += self.residue;
            self.residue = 0.0;
        } else if self.residue < -self.threshold {
            self.totals.loss += self.residue.abs();
            self.residue = 0.0;
        }
    }

    /// Committed totals. Any uncommitted residue is dropped.
    pub fn finish(self) -> ElevationTotals {
        self.totals
    }
}

/// Compute filtered elevation gain/loss over consecutive points.
///
/// Pairs where either point lacks an elevation are skipped. The residue left at the
/// end of the sequence is discarded rather than flushed.
///
/// ```rust
/// use trail_navigator::{TrackPoint, geo_utils};
///
/// let points: Vec<TrackPoint> = [100.0, 101.0, 102.0, 104.0]
///     .iter()
///     .map(|&ele| TrackPoint::new(45.0, 6.0).with_elevation(ele))
///     .collect();
///
/// let totals = geo_utils::filtered_elevation(&points, 3.0);
/// assert_eq!(totals.gain, 4.0);
/// ```
pub fn filtered_elevation(points: &[TrackPoint], threshold: f64) -> ElevationTotals {
    let mut acc = ElevationAccumulator::new(threshold);

    for w in points.windows(2) {
        if let (Some(prev), Some(curr)) = (w[0].elevation, w[1].elevation) {
            acc.push(curr - prev);
        }
    }

    acc.finish()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a GPS track.
///
/// For empty input, returns a bounds with MIN/MAX values that will fail any
/// containment check.
pub fn compute_bounds(points: &[TrackPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Compute the geographic center (centroid) of a GPS track.
///
/// Returns the arithmetic mean of all latitude and longitude values, or (0, 0)
/// for empty input. Fine for trail-sized areas, wrong across the antimeridian.
pub fn compute_center(points: &[TrackPoint]) -> GpsPoint {
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    GpsPoint::new(sum_lat / n, sum_lng / n)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn with_elevations(elevations: &[f64]) -> Vec<TrackPoint> {
        elevations
            .iter()
            .enumerate()
            .map(|(i, &ele)| TrackPoint::new(45.0 + i as f64 * 0.0001, 6.0).with_elevation(ele))
            .collect()
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(51.5074, -0.1278);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_antipodal() {
        let pairs = [
            (GpsPoint::new(24.975, -37.3), GpsPoint::new(-24.975, 142.7)),
            (GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 180.0)),
            (GpsPoint::new(90.0, 0.0), GpsPoint::new(-90.0, 0.0)),
        ];
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_METERS;

        for (a, b) in pairs {
            let d = haversine_distance(&a, &b);
            assert!(d.is_finite(), "{:?} -> {:?} gave {}", a, b, d);
            assert!(approx_eq(d, half_circumference, 1.0));
        }
    }

    #[test]
    fn test_antipodal_track_distance_is_finite() {
        let points = vec![TrackPoint::new(24.975, -37.3), TrackPoint::new(-24.975, 142.7)];
        assert!(polyline_length(&points).is_finite());
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        let dist = haversine_distance(&london, &paris);
        assert!(approx_eq(dist, 343_560.0, 5000.0));
    }

    #[test]
    fn test_haversine_distance_symmetric() {
        let pairs = [
            (GpsPoint::new(45.9237, 6.8694), GpsPoint::new(45.8326, 6.8652)),
            (GpsPoint::new(-33.8688, 151.2093), GpsPoint::new(-37.8136, 144.9631)),
            (GpsPoint::new(0.0, 179.9), GpsPoint::new(0.0, -179.9)),
        ];
        for (a, b) in pairs {
            assert!(approx_eq(haversine_distance(&a, &b), haversine_distance(&b, &a), 1e-6));
        }
    }

    #[test]
    fn test_haversine_one_degree_of_latitude() {
        // One degree along a meridian is R * pi / 180
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(1.0, 0.0);
        let expected = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;
        assert!(approx_eq(haversine_distance(&a, &b), expected, 1e-6));
    }

    #[test]
    fn test_polyline_length_empty_and_single() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[TrackPoint::new(51.5074, -0.1278)]), 0.0);
    }

    #[test]
    fn test_polyline_length_two_points() {
        let track = vec![
            TrackPoint::new(51.5074, -0.1278),
            TrackPoint::new(51.5080, -0.1280),
        ];
        let length = polyline_length(&track);
        assert!(length > 0.0);
        assert!(length < 100.0); // Should be about 68m
    }

    #[test]
    fn test_elevation_below_threshold_is_discarded() {
        // +1, +1, +1 sums to exactly 3, never strictly above the threshold
        let totals = filtered_elevation(&with_elevations(&[100.0, 101.0, 102.0, 103.0]), 3.0);
        assert_eq!(totals.gain, 0.0);
        assert_eq!(totals.loss, 0.0);
    }

    #[test]
    fn test_elevation_flushes_whole_residue() {
        // +1, +1, +2 crosses the threshold on the last step and commits all 4m
        let totals = filtered_elevation(&with_elevations(&[100.0, 101.0, 102.0, 104.0]), 3.0);
        assert_eq!(totals.gain, 4.0);
        assert_eq!(totals.loss, 0.0);
    }

    #[test]
    fn test_elevation_loss_and_noise() {
        // Climb 10m, jitter, then descend 8m
        let totals = filtered_elevation(
            &with_elevations(&[100.0, 110.0, 109.0, 110.0, 105.0, 102.0]),
            3.0,
        );
        assert_eq!(totals.gain, 10.0);
        // -1 +1 -5 -3 => residue reaches -5 after the third delta, flushed; -3 left over
        assert_eq!(totals.loss, 5.0);
    }

    #[test]
    fn test_elevation_skips_missing_values() {
        let mut points = with_elevations(&[100.0, 105.0]);
        points.insert(1, TrackPoint::new(45.00005, 6.0));
        // Neither pair has both elevations
        assert_eq!(filtered_elevation(&points, 3.0), ElevationTotals::default());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.005_1, 2), 1.01);
        assert_eq!(round_to(1.004, 2), 1.0);
        assert_eq!(round_to(7.25, 1), 7.3);
        assert_eq!(round_to(-2.5, 0), -3.0);
    }

    #[test]
    fn test_compute_bounds() {
        let track = vec![
            TrackPoint::new(51.50, -0.13),
            TrackPoint::new(51.51, -0.12),
            TrackPoint::new(51.505, -0.125),
        ];
        let bounds = compute_bounds(&track);
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
    }

    #[test]
    fn test_compute_center() {
        let track = vec![
            TrackPoint::new(51.50, -0.10),
            TrackPoint::new(51.52, -0.12),
        ];
        let center = compute_center(&track);
        assert!(approx_eq(center.latitude, 51.51, 0.001));
        assert!(approx_eq(center.longitude, -0.11, 0.001));
    }

    #[test]
    fn test_compute_center_empty() {
        let center = compute_center(&[]);
        assert_eq!(center.latitude, 0.0);
        assert_eq!(center.longitude, 0.0);
    }

    #[test]
    fn test_meters_to_degrees() {
        let deg = meters_to_degrees(111_320.0, 0.0);
        assert!(approx_eq(deg, 1.0, 0.01));

        let deg_45 = meters_to_degrees(111_320.0, 45.0);
        assert!(deg_45 > 1.0);
    }
}
