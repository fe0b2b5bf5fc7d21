//! Distance and climb left to the end of a reference track.
//!
//! The live position is snapped to the nearest track point by a linear scan; the
//! remainder is summed from there to the last point.

use crate::geo_utils::{haversine_distance, round_to};
use crate::{GpsPoint, TrackPoint};

/// What is left to cover from the current position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Remaining {
    /// Kilometers, 2 decimals
    pub distance_km: f64,
    /// Positive elevation still to climb, whole meters
    pub elevation_m: f64,
}

/// Index of the track point closest to `position`.
///
/// Ties go to the earliest point. Returns `None` for an empty track.
///
/// # Example
/// ```
/// use trail_navigator::{find_nearest_index, GpsPoint, TrackPoint};
///
/// let track = vec![TrackPoint::new(45.0, 6.0), TrackPoint::new(45.01, 6.0)];
/// assert_eq!(find_nearest_index(&GpsPoint::new(45.009, 6.0), &track), Some(1));
/// ```
pub fn find_nearest_index(position: &GpsPoint, track: &[TrackPoint]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (i, p) in track.iter().enumerate() {
        let d = haversine_distance(position, &p.position());
        match best {
            Some((_, min)) if d >= min => {}
            _ => best = Some((i, d)),
        }
    }

    best.map(|(i, _)| i)
}

/// Remaining distance and elevation gain from `position` to the end of `track`.
///
/// Tracks with fewer than two points have nothing remaining. Only climbs count
/// towards the elevation; descents are ignored. A point without elevation is
/// treated as sea level.
pub fn compute_remaining(position: &GpsPoint, track: &[TrackPoint]) -> Remaining {
    if track.len() < 2 {
        return Remaining::default();
    }
    let Some(start) = find_nearest_index(position, track) else {
        return Remaining::default();
    };

    let mut distance = 0.0;
    let mut elevation = 0.0;

    for w in track[start..].windows(2) {
        distance += w[0].distance_to(&w[1]);

        let prev = w[0].elevation.unwrap_or(0.0);
        let curr = w[1].elevation.unwrap_or(0.0);
        if curr > prev {
            elevation += curr - prev;
        }
    }

    Remaining {
        distance_km: round_to(distance / 1000.0, 2),
        elevation_m: elevation.round(),
    }
}
