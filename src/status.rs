//! Watering progress reporting.
//!
//! The executor is the only producer of [`WateringStatus`] snapshots.
//! Observers (serial console, display, admin API) subscribe to the
//! bounded [`StatusChannel`] without the executor knowing about them.
//!
//! ## Backpressure
//!
//! When a subscriber lags and the queue is full, [`StatusPublisher`]
//! retries in short steps until `timeout` has elapsed and then drops the
//! snapshot with a warning.  The watering run is therefore held up by at
//! most one timeout per snapshot and never blocks indefinitely on a slow
//! observer.  The most recent snapshot is always kept in [`LatestStatus`],
//! dropped or not.

use core::fmt;
use core::time::Duration;
use std::sync::Mutex;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};
use embedded_hal::delay::DelayNs;
use log::warn;

pub const STATUS_QUEUE_DEPTH: usize = 8;
pub const MAX_STATUS_SUBSCRIBERS: usize = 4;
pub const MAX_STATUS_PUBLISHERS: usize = 1;

/// Retry step while the queue is full.
const PUBLISH_RETRY_STEP_MS: u32 = 10;

pub type StatusChannel = PubSubChannel<
    CriticalSectionRawMutex,
    WateringStatus,
    STATUS_QUEUE_DEPTH,
    MAX_STATUS_SUBSCRIBERS,
    MAX_STATUS_PUBLISHERS,
>;

pub type StatusSubscriber<'a> = Subscriber<
    'a,
    CriticalSectionRawMutex,
    WateringStatus,
    STATUS_QUEUE_DEPTH,
    MAX_STATUS_SUBSCRIBERS,
    MAX_STATUS_PUBLISHERS,
>;

/// Executor phase for one plant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum WateringPhase {
    #[default]
    Idle,
    Priming,
    PumpOn,
    Flowing,
    Finished,
}

impl WateringPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Priming => "priming",
            Self::PumpOn => "pump-starting",
            Self::Flowing => "flowing",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for WateringPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress snapshot for the plant currently being watered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WateringStatus {
    pub plant_id: u8,
    pub flow_ml: f32,
    pub elapsed_s: u32,
    pub phase: WateringPhase,
}

impl fmt::Display for WateringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "plant={} phase={} flow={:.1}ml elapsed={}s",
            self.plant_id, self.phase, self.flow_ml, self.elapsed_s
        )
    }
}

/// Last snapshot produced, readable at any time.
#[derive(Debug, Default)]
pub struct LatestStatus(Mutex<WateringStatus>);

impl LatestStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> WateringStatus {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set(&self, status: WateringStatus) {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = status;
    }
}

/// Producer half used by the executor.
pub struct StatusPublisher<'a> {
    channel: &'a StatusChannel,
    latest: &'a LatestStatus,
    timeout: Duration,
    dropped: u32,
}

impl<'a> StatusPublisher<'a> {
    pub fn new(channel: &'a StatusChannel, latest: &'a LatestStatus, timeout: Duration) -> Self {
        Self {
            channel,
            latest,
            timeout,
            dropped: 0,
        }
    }

    /// Publish `status`, waiting up to the timeout for queue space.
    ///
    /// Returns `false` if the snapshot was dropped.
    pub fn publish(&mut self, status: WateringStatus, delay: &mut impl DelayNs) -> bool {
        self.latest.set(status);

        let publisher = self.channel.immediate_publisher();
        let budget_ms = self.timeout.as_millis().min(u128::from(u32::MAX)) as u32;
        let mut waited_ms = 0u32;
        let mut pending = status;

        loop {
            match publisher.try_publish(pending) {
                Ok(()) => return true,
                Err(back) => pending = back,
            }
            if waited_ms >= budget_ms {
                self.dropped = self.dropped.saturating_add(1);
                warn!(
                    "status queue full, dropped {} ({} dropped so far)",
                    pending, self.dropped
                );
                return false;
            }
            let step = PUBLISH_RETRY_STEP_MS.min(budget_ms - waited_ms).max(1);
            delay.delay_ms(step);
            waited_ms = waited_ms.saturating_add(step);
        }
    }

    /// Snapshots dropped because the queue stayed full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
