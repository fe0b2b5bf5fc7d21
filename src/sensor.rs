//! Position sensor interface.
//!
//! The geolocation source is external. It pushes [`SensorEvent`]s through a
//! [`SensorFeed`]; the consumer holds the matching [`Subscription`] and drains it.
//! Cancelling or dropping the subscription closes the channel, after which the
//! feed reports itself inactive and further deliveries are refused.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::TrackPoint;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// One position fix from the sensor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level, when the sensor reports it
    pub altitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl From<&PositionSample> for TrackPoint {
    fn from(sample: &PositionSample) -> Self {
        TrackPoint {
            latitude: sample.latitude,
            longitude: sample.longitude,
            elevation: sample.altitude,
            timestamp: Some(sample.timestamp),
        }
    }
}

/// Errors reported by the sensor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// No fix arrived in time; the sensor keeps trying.
    #[error("timed out waiting for a GPS fix")]
    Timeout,
    /// Anything else: permission denied, hardware unavailable, ...
    #[error("position sensor failure: {0}")]
    Failure(String),
}

impl SensorError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SensorError::Timeout)
    }
}

/// What travels from the sensor to the subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Position(PositionSample),
    Error(SensorError),
}

/// Sensor side of a subscription.
#[derive(Debug, Clone)]
pub struct SensorFeed {
    id: u64,
    tx: UnboundedSender<SensorEvent>,
}

impl SensorFeed {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Send a position fix. Returns false once the subscription is gone.
    pub fn deliver(&self, sample: PositionSample) -> bool {
        self.tx.send(SensorEvent::Position(sample)).is_ok()
    }

    /// Report an error. Returns false once the subscription is gone.
    pub fn fail(&self, error: SensorError) -> bool {
        self.tx.send(SensorEvent::Error(error)).is_ok()
    }

    pub fn is_active(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Consumer side of a subscription. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: UnboundedReceiver<SensorEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop receiving events. Anything already queued is discarded.
    pub fn cancel(mut self) {
        self.rx.close();
    }

    /// Next queued event without waiting. `None` when nothing is queued or the
    /// sensor side has gone away.
    pub fn try_next(&mut self) -> Option<SensorEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next event. `None` once every feed has been dropped.
    pub async fn next(&mut self) -> Option<SensorEvent> {
        self.rx.recv().await
    }
}

/// Create a connected feed/subscription pair.
pub fn sensor_channel() -> (SensorFeed, Subscription) {
    let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::unbounded_channel();
    (SensorFeed { id, tx }, Subscription { id, rx })
}

/// Something that can be watched for position fixes.
pub trait PositionSource {
    /// Begin watching. Each call returns a fresh subscription.
    fn watch(&mut self) -> Subscription;
}

/// Position source driven by hand through its current feed.
///
/// Useful for hosts that receive fixes from a platform callback, and for tests.
#[derive(Debug, Default)]
pub struct ChannelSource {
    feed: Option<SensorFeed>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed of the most recent `watch` call.
    pub fn feed(&self) -> Option<&SensorFeed> {
        self.feed.as_ref()
    }
}

impl PositionSource for ChannelSource {
    fn watch(&mut self) -> Subscription {
        let (feed, subscription) = sensor_channel();
        self.feed = Some(feed);
        subscription
    }
}
