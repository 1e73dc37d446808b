//! Controller configuration.
//!
//! [`Settings`] is the persisted aggregate root: it is loaded from the
//! EEPROM at boot (or defaulted), mutated by the console / admin handlers
//! and the clock-sync routine, and written back after every mutation.
//! [`WateringConfig`] holds the compile-time tunables of the watering
//! sequence and is never persisted.

use core::time::Duration;

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::pins::VALVE_COUNT;
use crate::schedule::AlarmSlot;

/// Capacity of the alarm table.
pub const MAX_ALARMS: usize = 10;
/// Capacity of the plant table.
pub const MAX_PLANTS: usize = 12;
/// Largest pot-size class accepted for a plant.
pub const MAX_SIZE_CLASS: u8 = 4;

pub const HOSTNAME_CAPACITY: usize = 32;
pub const DEVICE_ID_CAPACITY: usize = 16;

/// Enabled / disabled flag shared by alarm records and plants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Disabled,
    Enabled,
}

impl Status {
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Wire value used by the admin JSON contract.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Enabled => 1,
        }
    }

    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Disabled),
            1 => Some(Self::Enabled),
            _ => None,
        }
    }
}

/// One plant: a valve and its pot-size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plant {
    /// Valve index on the expander.
    pub id: u8,
    /// Relative pot-size class, `1..=MAX_SIZE_CLASS`.
    pub size: u8,
    pub status: Status,
}

impl Plant {
    pub const fn new(id: u8, size: u8) -> Self {
        Self {
            id,
            size,
            status: Status::Enabled,
        }
    }
}

/// Optional hardware detected at boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_display: bool,
    pub has_rtc: bool,
    pub has_eeprom: bool,
    pub has_mcp: bool,
}

impl Capabilities {
    /// Every optional device fitted.
    pub const fn all() -> Self {
        Self {
            has_display: true,
            has_rtc: true,
            has_eeprom: true,
            has_mcp: true,
        }
    }
}

/// Persisted controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub hostname: String<HOSTNAME_CAPACITY>,
    pub device_id: String<DEVICE_ID_CAPACITY>,
    /// Local epoch seconds of the last successful clock sync.
    pub last_sync: i64,
    /// Local epoch seconds of the last schedule / plant mutation.
    pub last_update: i64,
    pub reboot_on_wifi_fail: bool,
    /// Flow-sensor pulses per (ml/s) divisor.
    pub flow_calibration_factor: f32,
    pub alarms: Vec<AlarmSlot, MAX_ALARMS>,
    pub plants: Vec<Plant, MAX_PLANTS>,
    pub capabilities: Capabilities,
}

impl Default for Settings {
    fn default() -> Self {
        let mut hostname = String::new();
        let _ = hostname.push_str("smartgreen");
        let mut device_id = String::new();
        let _ = device_id.push_str("SG-000000");
        Self {
            hostname,
            device_id,
            last_sync: 0,
            last_update: 0,
            reboot_on_wifi_fail: true,
            flow_calibration_factor: 410.0,
            alarms: Vec::new(),
            plants: Vec::new(),
            capabilities: Capabilities::default(),
        }
    }
}

impl Settings {
    /// Reject values the controller cannot act on safely.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.flow_calibration_factor.is_finite() || self.flow_calibration_factor <= 0.0 {
            return Err(ValidationError::OutOfRange("flow_calibration_factor"));
        }
        validate_alarms(&self.alarms)?;
        validate_plants(&self.plants)
    }

    /// Enabled plants in table order.
    pub fn enabled_plants(&self) -> impl Iterator<Item = &Plant> {
        self.plants.iter().filter(|p| p.status.is_enabled())
    }
}

pub fn validate_alarms(alarms: &[AlarmSlot]) -> Result<(), ValidationError> {
    if alarms.len() > MAX_ALARMS {
        return Err(ValidationError::TooManyEntries { max: MAX_ALARMS });
    }
    for slot in alarms {
        for record in [slot.start, slot.end] {
            if record.hour > 23 {
                return Err(ValidationError::OutOfRange("hour"));
            }
            if record.minute > 59 {
                return Err(ValidationError::OutOfRange("minute"));
            }
            if record.weekday_mask.bits() > 0x7F {
                return Err(ValidationError::OutOfRange("weekday"));
            }
        }
        // Disabled slots keep whatever times they were stored with.
        if slot.is_armed() && !slot.can_open() {
            return Err(ValidationError::OutOfRange("window"));
        }
    }
    Ok(())
}

pub fn validate_plants(plants: &[Plant]) -> Result<(), ValidationError> {
    if plants.len() > MAX_PLANTS {
        return Err(ValidationError::TooManyEntries { max: MAX_PLANTS });
    }
    let mut seen: u16 = 0;
    for plant in plants {
        if plant.id >= VALVE_COUNT {
            return Err(ValidationError::OutOfRange("id"));
        }
        if plant.size == 0 || plant.size > MAX_SIZE_CLASS {
            return Err(ValidationError::OutOfRange("size"));
        }
        let bit = 1u16 << plant.id;
        if seen & bit != 0 {
            return Err(ValidationError::DuplicateValve(plant.id));
        }
        seen |= bit;
    }
    Ok(())
}

/// Timing and sizing of the watering sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WateringConfig {
    /// Valve open → pump on.
    pub valve_settle: Duration,
    /// Pump transition hold.
    pub pump_settle: Duration,
    /// Flow sampling window.
    pub sample_window: Duration,
    /// Nominal pump output, used to bound the run time.
    pub pump_ml_per_minute: u32,
    /// Target volume per size class.
    pub ml_per_size_class: u32,
    pub min_duration: Duration,
    pub max_duration: Duration,
    /// How long a full status queue may hold up the producer.
    pub status_publish_timeout: Duration,
    /// Supervisor poll cadence.
    pub supervisor_poll: Duration,
}

impl Default for WateringConfig {
    fn default() -> Self {
        Self {
            valve_settle: Duration::from_millis(500),
            pump_settle: Duration::from_millis(500),
            sample_window: Duration::from_millis(1000),
            pump_ml_per_minute: 575,
            ml_per_size_class: 150,
            min_duration: Duration::from_secs(5),
            max_duration: Duration::from_secs(600),
            status_publish_timeout: Duration::from_millis(200),
            supervisor_poll: Duration::from_millis(1000),
        }
    }
}

impl WateringConfig {
    /// Volume at which the plant's run stops early.
    pub fn target_volume_ml(&self, plant: &Plant) -> f32 {
        (u32::from(plant.size) * self.ml_per_size_class) as f32
    }

    /// Upper bound on the plant's run: twice the nominal pump time for the
    /// target volume, clamped to `[min_duration, max_duration]`.
    pub fn run_duration(&self, plant: &Plant) -> Duration {
        let target = self.target_volume_ml(plant);
        let nominal_secs = target / self.pump_ml_per_minute.max(1) as f32 * 60.0;
        let secs = (nominal_secs * 2.0).ceil() as u64;
        Duration::from_secs(secs).clamp(self.min_duration, self.max_duration)
    }
}
