//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ WateringExecutor / AppService (domain)
//! ```
//!
//! Driven adapters (relay expander, clock, EEPROM, log output) implement
//! these traits.  The executor and the application service consume them
//! via generics, so the domain core never touches hardware directly.
//! Delays are the `embedded-hal` [`DelayNs`](embedded_hal::delay::DelayNs)
//! trait and need no port of their own.

use core::fmt;

use crate::config::Settings;
use crate::error::{BusError, Error, StorageError, ValidationError};
use crate::schedule::ClockTime;

// ───────────────────────────────────────────────────────────────
// Actuator bus (domain → relays)
// ───────────────────────────────────────────────────────────────

/// Logical output level; the adapter maps it to the relay polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    On,
    Off,
}

impl OutputLevel {
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Valves and pump on one index space (`0..VALVE_COUNT` valves, then the
/// pump).  Every call is one bounded bus transaction.
pub trait ActuatorBus {
    fn set_output(&mut self, index: u8, level: OutputLevel) -> Result<(), BusError>;

    fn set_all_outputs(&mut self, level: OutputLevel) -> Result<(), BusError>;

    /// Bitmap of energized outputs.
    fn output_state(&self) -> u16;
}

impl<T: ActuatorBus + ?Sized> ActuatorBus for &mut T {
    fn set_output(&mut self, index: u8, level: OutputLevel) -> Result<(), BusError> {
        T::set_output(self, index, level)
    }

    fn set_all_outputs(&mut self, level: OutputLevel) -> Result<(), BusError> {
        T::set_all_outputs(self, level)
    }

    fn output_state(&self) -> u16 {
        T::output_state(self)
    }
}

// ───────────────────────────────────────────────────────────────
// Clock source (wall clock ↔ domain)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The clock chip did not answer.
    Bus(BusError),
    /// The chip returned, or was asked to hold, an impossible date.
    InvalidTime,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "clock bus error: {e}"),
            Self::InvalidTime => write!(f, "invalid clock time"),
        }
    }
}

impl From<BusError> for ClockError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<ClockError> for Error {
    fn from(e: ClockError) -> Self {
        match e {
            ClockError::Bus(b) => Self::Bus(b),
            ClockError::InvalidTime => Self::Validation(ValidationError::OutOfRange("time")),
        }
    }
}

/// Wall-clock time in local civil time.  The scheduler depends only on
/// this, never on a particular clock chip.
pub trait ClockSource {
    fn now(&self) -> Result<ClockTime, ClockError>;

    /// Set the clock to local epoch seconds.
    fn set(&mut self, unix: i64) -> Result<(), ClockError>;
}

impl<T: ClockSource + ?Sized> ClockSource for &mut T {
    fn now(&self) -> Result<ClockTime, ClockError> {
        T::now(self)
    }

    fn set(&mut self, unix: i64) -> Result<(), ClockError> {
        T::set(self, unix)
    }
}

// ───────────────────────────────────────────────────────────────
// Watering log (domain → log output)
// ───────────────────────────────────────────────────────────────

/// One completed plant watering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    pub timestamp: i64,
    pub label: &'static str,
    pub plant_id: u8,
    pub volume_ml: f32,
    pub duration_s: u32,
}

/// Append-only sink for watering records.
pub trait WateringLogger {
    fn record(&mut self, record: LogRecord);
}

impl<T: WateringLogger + ?Sized> WateringLogger for &mut T {
    fn record(&mut self, record: LogRecord) {
        T::record(self, record);
    }
}

// ───────────────────────────────────────────────────────────────
// Settings store (domain ↔ persistent storage)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`Settings`].
///
/// Implementations validate before persisting and must be idempotent:
/// saving what was just loaded leaves the stored bytes unchanged.
pub trait SettingsStore {
    fn load(&mut self) -> Result<Settings, StorageError>;

    fn save(&mut self, settings: &Settings) -> Result<(), StorageError>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for &mut T {
    fn load(&mut self) -> Result<Settings, StorageError> {
        T::load(self)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), StorageError> {
        T::save(self, settings)
    }
}
