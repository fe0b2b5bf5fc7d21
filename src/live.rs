//! Live session recording.
//!
//! [`LiveTracker`] is a small state machine: `start` resets and begins a session,
//! each position sample is appended and folded into the running totals, `stop`
//! freezes the session until the next `start`. All values are kept unrounded;
//! [`LiveMetrics::rounded`] gives display precision.
//!
//! Unlike [`Track`](crate::Track) parsing, live elevation gain is not filtered:
//! every positive difference between consecutive fixes counts immediately.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::export::export_track;
use crate::geo_utils::round_to;
use crate::sensor::{PositionSample, PositionSource, SensorError, SensorEvent, Subscription};
use crate::{ExportError, TrackPoint};

/// Source of "now" for elapsed-time computations.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where the tracker is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackerState {
    /// Never started
    #[default]
    Idle,
    /// Recording
    Active,
    /// Stopped; the last session is still readable
    Stopped,
}

/// Running totals of a live session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LiveMetrics {
    pub distance_km: f64,
    pub elevation_gain_m: f64,
    pub average_speed_kmh: f64,
    pub state: TrackerState,
}

impl LiveMetrics {
    /// Display precision: distance to 2 decimals, elevation to the meter, speed to 1 decimal.
    pub fn rounded(&self) -> Self {
        Self {
            distance_km: round_to(self.distance_km, 2),
            elevation_gain_m: self.elevation_gain_m.round(),
            average_speed_kmh: round_to(self.average_speed_kmh, 1),
            state: self.state,
        }
    }
}

/// Records a live session from a stream of position samples.
#[derive(Debug)]
pub struct LiveTracker<C: Clock = SystemClock> {
    clock: C,
    state: TrackerState,
    points: Vec<TrackPoint>,
    distance_km: f64,
    elevation_gain_m: f64,
    average_speed_kmh: f64,
    started_at: Option<DateTime<Utc>>,
    subscription: Option<Subscription>,
}

impl LiveTracker<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for LiveTracker<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> LiveTracker<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: TrackerState::Idle,
            points: Vec::new(),
            distance_km: 0.0,
            elevation_gain_m: 0.0,
            average_speed_kmh: 0.0,
            started_at: None,
            subscription: None,
        }
    }

    /// Begin a new session, discarding the previous one.
    ///
    /// Any subscription still held is cancelled first, so samples from an
    /// earlier watch can't leak into the new session.
    pub fn start(&mut self) {
        self.cancel_subscription();

        self.points.clear();
        self.distance_km = 0.0;
        self.elevation_gain_m = 0.0;
        self.average_speed_kmh = 0.0;
        self.started_at = Some(self.clock.now());
        self.state = TrackerState::Active;

        info!("Live session started");
    }

    /// Begin a new session and subscribe to `source`.
    pub fn start_watching(&mut self, source: &mut dyn PositionSource) {
        self.start();
        let subscription = source.watch();
        debug!("Watching position source (subscription {})", subscription.id());
        self.subscription = Some(subscription);
    }

    /// Stop recording and release the subscription. Data stays readable.
    pub fn stop(&mut self) {
        self.cancel_subscription();
        if self.state == TrackerState::Active {
            self.state = TrackerState::Stopped;
            info!(
                "Live session stopped: {} points, {:.2}km, +{:.0}m",
                self.points.len(),
                self.distance_km,
                self.elevation_gain_m
            );
        }
    }

    /// Fold one position sample into the session.
    ///
    /// Returns false, leaving everything untouched, when the tracker is not active
    /// or the fix has no usable coordinates.
    pub fn on_sample(&mut self, sample: PositionSample) -> bool {
        if self.state != TrackerState::Active {
            warn!("Ignoring position sample while {:?}", self.state);
            return false;
        }

        let point = TrackPoint::from(&sample);
        if !point.position().is_valid() {
            warn!(
                "Dropping position sample with invalid coordinates ({}, {})",
                sample.latitude, sample.longitude
            );
            return false;
        }

        if let Some(prev) = self.points.last() {
            self.distance_km += prev.distance_to(&point) / 1000.0;

            if let (Some(prev_ele), Some(ele)) = (prev.elevation, point.elevation) {
                if ele > prev_ele {
                    self.elevation_gain_m += ele - prev_ele;
                }
            }
        }

        if let Some(started_at) = self.started_at {
            let elapsed_ms = (self.clock.now() - started_at).num_milliseconds();
            if elapsed_ms > 0 {
                let elapsed_hours = elapsed_ms as f64 / 3_600_000.0;
                self.average_speed_kmh = self.distance_km / elapsed_hours;
            }
        }

        self.points.push(point);
        debug!(
            "Sample #{} at ({:.5}, {:.5}): {:.3}km total",
            self.points.len(),
            sample.latitude,
            sample.longitude,
            self.distance_km
        );
        true
    }

    /// Process every event already queued on the subscription.
    ///
    /// Timeouts are logged and skipped. A sensor failure stops the draining and is
    /// returned; the session itself is left as it was, and deciding whether to
    /// stop is up to the caller. Returns how many samples were recorded.
    pub fn poll(&mut self) -> Result<usize, SensorError> {
        let mut recorded = 0;

        loop {
            let Some(event) = self.subscription.as_mut().and_then(Subscription::try_next) else {
                return Ok(recorded);
            };
            match self.handle_event(event) {
                Ok(true) => recorded += 1,
                Ok(false) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait for the next sensor event and process it.
    ///
    /// Resolves to `None` when there is no subscription or the sensor went away,
    /// otherwise to whether a sample was recorded.
    pub async fn next_event(&mut self) -> Option<Result<bool, SensorError>> {
        let event = self.subscription.as_mut()?.next().await?;
        Some(self.handle_event(event))
    }

    fn handle_event(&mut self, event: SensorEvent) -> Result<bool, SensorError> {
        match event {
            SensorEvent::Position(sample) => Ok(self.on_sample(sample)),
            SensorEvent::Error(SensorError::Timeout) => {
                warn!("Waiting for GPS signal...");
                Ok(false)
            }
            SensorEvent::Error(e) => {
                error!("Position sensor error: {}", e);
                Err(e)
            }
        }
    }

    fn cancel_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            debug!("Cancelling subscription {}", subscription.id());
            subscription.cancel();
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TrackerState::Active
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    /// Recorded points in arrival order.
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.points.last()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Unrounded running totals.
    pub fn metrics(&self) -> LiveMetrics {
        LiveMetrics {
            distance_km: self.distance_km,
            elevation_gain_m: self.elevation_gain_m,
            average_speed_kmh: self.average_speed_kmh,
            state: self.state,
        }
    }

    /// Export the recorded points as a GPX document.
    pub fn export(&self, name: &str) -> Result<String, ExportError> {
        export_track(name, &self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;
    use crate::sensor::ChannelSource;
    use crate::{parse_track, GpsPoint};
    use chrono::{Duration, TimeZone};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct TestClock(Rc<Cell<DateTime<Utc>>>);

    impl TestClock {
        fn new() -> Self {
            Self(Rc::new(Cell::new(Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap())))
        }

        fn advance(&self, seconds: i64) {
            self.0.set(self.0.get() + Duration::seconds(seconds));
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.get()
        }
    }

    fn sample(clock: &TestClock, latitude: f64, longitude: f64, altitude: Option<f64>) -> PositionSample {
        PositionSample { latitude, longitude, altitude, timestamp: clock.now() }
    }

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_idle_tracker_ignores_samples() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());

        assert_eq!(tracker.state(), TrackerState::Idle);
        assert!(!tracker.on_sample(sample(&clock, 45.0, 6.0, None)));
        assert!(tracker.points().is_empty());
        assert_eq!(tracker.metrics(), LiveMetrics::default());
    }

    #[test]
    fn test_invalid_samples_are_dropped() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        assert_eq!(TrackerState::default(), TrackerState::Idle);
        tracker.start();

        assert!(tracker.on_sample(sample(&clock, 45.0, 6.0, Some(1000.0))));
        clock.advance(30);
        assert!(!tracker.on_sample(sample(&clock, f64::NAN, 6.0, Some(1100.0))));
        assert!(!tracker.on_sample(sample(&clock, 45.0, f64::INFINITY, None)));
        assert!(!tracker.on_sample(sample(&clock, 91.0, 6.0, None)));

        let metrics = tracker.metrics();
        assert_eq!(tracker.points().len(), 1);
        assert_eq!(metrics.distance_km, 0.0);
        assert_eq!(metrics.elevation_gain_m, 0.0);
    }

    #[test]
    fn test_right_angle_path_distance() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        tracker.start();

        let a = GpsPoint::new(45.0, 6.0);
        let b = GpsPoint::new(45.0, 6.01);
        let c = GpsPoint::new(45.01, 6.01);

        for p in [a, b, c] {
            clock.advance(60);
            assert!(tracker.on_sample(sample(&clock, p.latitude, p.longitude, None)));
        }
        tracker.stop();

        let expected_km = (haversine_distance(&a, &b) + haversine_distance(&b, &c)) / 1000.0;
        let metrics = tracker.metrics();
        assert!(approx_eq(metrics.distance_km, expected_km, 1e-9));
        assert_eq!(metrics.rounded().distance_km, round_to(expected_km, 2));
        assert_eq!(metrics.state, TrackerState::Stopped);
        assert_eq!(tracker.points().len(), 3);
    }

    #[test]
    fn test_average_speed() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        tracker.start();

        tracker.on_sample(sample(&clock, 45.0, 6.0, None));
        clock.advance(1800);
        tracker.on_sample(sample(&clock, 45.01, 6.0, None));

        // Half an hour for ~1.11km
        let metrics = tracker.metrics();
        assert!(approx_eq(metrics.average_speed_kmh, metrics.distance_km * 2.0, 1e-9));
        assert_eq!(metrics.rounded().average_speed_kmh, 2.2);
    }

    #[test]
    fn test_average_speed_unchanged_at_start_instant() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        tracker.start();

        // Both samples arrive with no time elapsed since start
        tracker.on_sample(sample(&clock, 45.0, 6.0, None));
        tracker.on_sample(sample(&clock, 45.001, 6.0, None));

        let metrics = tracker.metrics();
        assert!(metrics.distance_km > 0.0);
        assert_eq!(metrics.average_speed_kmh, 0.0);
        assert!(metrics.average_speed_kmh.is_finite());

        clock.advance(60);
        tracker.on_sample(sample(&clock, 45.002, 6.0, None));
        let previous = tracker.metrics().average_speed_kmh;
        assert!(previous > 0.0);

        // Time going backwards leaves the average alone
        clock.advance(-120);
        tracker.on_sample(sample(&clock, 45.003, 6.0, None));
        assert_eq!(tracker.metrics().average_speed_kmh, previous);
    }

    #[test]
    fn test_elevation_gain_is_unfiltered() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        tracker.start();

        for (i, ele) in [Some(1000.0), Some(1001.0), Some(999.5), None, Some(1010.0), Some(1011.5)]
            .into_iter()
            .enumerate()
        {
            clock.advance(10);
            tracker.on_sample(sample(&clock, 45.0 + i as f64 * 0.0001, 6.0, ele));
        }

        // +1 counts even though it's below any noise threshold, the drop is ignored,
        // the pairs around the missing altitude are skipped, then +1.5
        assert_eq!(tracker.metrics().elevation_gain_m, 2.5);
    }

    #[test]
    fn test_restart_resets_session() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        tracker.start();
        tracker.on_sample(sample(&clock, 45.0, 6.0, Some(100.0)));
        clock.advance(60);
        tracker.on_sample(sample(&clock, 45.01, 6.0, Some(150.0)));
        tracker.stop();

        // Stopped session is frozen
        assert!(!tracker.on_sample(sample(&clock, 46.0, 6.0, None)));
        assert_eq!(tracker.points().len(), 2);

        clock.advance(60);
        tracker.start();
        assert_eq!(tracker.state(), TrackerState::Active);
        assert!(tracker.points().is_empty());
        assert_eq!(tracker.metrics().distance_km, 0.0);
        assert_eq!(tracker.metrics().elevation_gain_m, 0.0);
        assert_eq!(tracker.started_at(), Some(clock.now()));
    }

    #[test]
    fn test_poll_drains_subscription() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        let mut source = ChannelSource::new();
        tracker.start_watching(&mut source);

        let feed = source.feed().unwrap().clone();
        feed.deliver(sample(&clock, 45.0, 6.0, None));
        feed.fail(SensorError::Timeout);
        feed.deliver(sample(&clock, 45.001, 6.0, None));

        assert_eq!(tracker.poll(), Ok(2));
        assert_eq!(tracker.points().len(), 2);
        assert_eq!(tracker.poll(), Ok(0));
    }

    #[test]
    fn test_poll_surfaces_failure() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        let mut source = ChannelSource::new();
        tracker.start_watching(&mut source);

        let feed = source.feed().unwrap().clone();
        feed.deliver(sample(&clock, 45.0, 6.0, None));
        feed.fail(SensorError::Failure("permission denied".into()));
        feed.deliver(sample(&clock, 45.001, 6.0, None));

        assert_eq!(tracker.poll(), Err(SensorError::Failure("permission denied".into())));
        // Still recording; the queued sample is picked up on the next poll
        assert!(tracker.is_active());
        assert_eq!(tracker.points().len(), 1);
        assert_eq!(tracker.poll(), Ok(1));
    }

    #[test]
    fn test_restart_replaces_subscription() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        let mut source = ChannelSource::new();

        tracker.start_watching(&mut source);
        let old_feed = source.feed().unwrap().clone();
        tracker.start_watching(&mut source);
        let new_feed = source.feed().unwrap().clone();

        assert!(!old_feed.is_active());
        assert!(!old_feed.deliver(sample(&clock, 45.0, 6.0, None)));
        assert!(new_feed.deliver(sample(&clock, 45.0, 6.0, None)));
        assert_eq!(tracker.poll(), Ok(1));
        assert_eq!(tracker.points().len(), 1);
    }

    #[test]
    fn test_stop_cancels_subscription() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        let mut source = ChannelSource::new();
        tracker.start_watching(&mut source);
        let feed = source.feed().unwrap().clone();

        tracker.stop();
        assert!(!tracker.has_subscription());
        assert!(!feed.is_active());
        assert_eq!(tracker.poll(), Ok(0));
    }

    #[test]
    fn test_export_round_trip() {
        let clock = TestClock::new();
        let mut tracker = LiveTracker::with_clock(clock.clone());
        assert!(matches!(tracker.export("nothing"), Err(ExportError::NoPoints)));

        tracker.start();
        tracker.on_sample(sample(&clock, 45.923_7, 6.869_4, Some(1035.2)));
        clock.advance(5);
        tracker.on_sample(sample(&clock, 45.924_3, 6.870_1, None));
        tracker.stop();

        let gpx = tracker.export("Session").unwrap();
        let track = parse_track(&gpx).unwrap();
        assert_eq!(track.points(), tracker.points());
    }

    #[tokio::test]
    async fn test_next_event() {
        let mut tracker = LiveTracker::new();
        assert!(tracker.next_event().await.is_none());

        let mut source = ChannelSource::new();
        tracker.start_watching(&mut source);
        let feed = source.feed().unwrap().clone();

        feed.fail(SensorError::Timeout);
        feed.deliver(PositionSample {
            latitude: 45.0,
            longitude: 6.0,
            altitude: None,
            timestamp: Utc::now(),
        });

        assert_eq!(tracker.next_event().await, Some(Ok(false)));
        assert_eq!(tracker.next_event().await, Some(Ok(true)));
        assert_eq!(tracker.points().len(), 1);
    }
}
