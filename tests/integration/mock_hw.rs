//! Mock hardware for integration tests.
//!
//! Records every actuator call so tests can assert on the full command
//! history, injects flow-sensor edges while the executor "sleeps", and
//! scripts the wall clock.

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use smartgreen::app::ports::{
    ActuatorBus, ClockError, ClockSource, LogRecord, OutputLevel, SettingsStore, WateringLogger,
};
use smartgreen::config::Settings;
use smartgreen::error::{BusError, StorageError};
use smartgreen::flow::PulseCounter;
use smartgreen::schedule::ClockTime;

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Set { index: u8, on: bool },
    All { on: bool },
}

// ── MockActuators ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockActuators {
    pub calls: Vec<ActuatorCall>,
    state: u16,
    /// Fail the first call matching this output/level.
    fail_on: Option<(u8, bool)>,
}

#[allow(dead_code)]
impl MockActuators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(index: u8, on: bool) -> Self {
        Self {
            fail_on: Some((index, on)),
            ..Self::default()
        }
    }

    pub fn is_on(&self, index: u8) -> bool {
        self.state & (1 << index) != 0
    }
}

impl ActuatorBus for MockActuators {
    fn set_output(&mut self, index: u8, level: OutputLevel) -> Result<(), BusError> {
        let on = level.is_on();
        self.calls.push(ActuatorCall::Set { index, on });
        if self.fail_on == Some((index, on)) {
            self.fail_on = None;
            return Err(BusError::NoAcknowledge(0x20));
        }
        if on {
            self.state |= 1 << index;
        } else {
            self.state &= !(1 << index);
        }
        Ok(())
    }

    fn set_all_outputs(&mut self, level: OutputLevel) -> Result<(), BusError> {
        let on = level.is_on();
        self.calls.push(ActuatorCall::All { on });
        self.state = if on { u16::MAX } else { 0 };
        Ok(())
    }

    fn output_state(&self) -> u16 {
        self.state
    }
}

// ── PulseDelay ────────────────────────────────────────────────

/// Delay that does not sleep; instead it feeds `pulses_per_second`
/// edges into the counter for every millisecond that passes.
pub struct PulseDelay<'a> {
    counter: &'a PulseCounter,
    pub pulses_per_second: u32,
    pub elapsed_ms: u64,
}

#[allow(dead_code)]
impl<'a> PulseDelay<'a> {
    pub fn new(counter: &'a PulseCounter, pulses_per_second: u32) -> Self {
        Self {
            counter,
            pulses_per_second,
            elapsed_ms: 0,
        }
    }
}

impl DelayNs for PulseDelay<'_> {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms += u64::from(ms);
        let edges = u64::from(ms) * u64::from(self.pulses_per_second) / 1000;
        for _ in 0..edges {
            self.counter.on_edge();
        }
    }
}

/// Delay that does nothing.
#[allow(dead_code)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Logger ────────────────────────────────────────────────────

#[derive(Default)]
pub struct VecLogger {
    pub records: Vec<LogRecord>,
}

impl WateringLogger for VecLogger {
    fn record(&mut self, record: LogRecord) {
        self.records.push(record);
    }
}

// ── ScriptedClock ─────────────────────────────────────────────

/// Returns scripted readings in order, then repeats the last one.
pub struct ScriptedClock {
    readings: VecDeque<i64>,
    current: i64,
    pub sets: Vec<i64>,
    pub broken: bool,
}

#[allow(dead_code)]
impl ScriptedClock {
    pub fn at(unix: i64) -> Self {
        Self::script(&[unix])
    }

    pub fn script(readings: &[i64]) -> Self {
        Self {
            readings: readings.iter().skip(1).copied().collect(),
            current: readings.first().copied().unwrap_or(0),
            sets: Vec::new(),
            broken: false,
        }
    }

    pub fn advance(&mut self) {
        if let Some(next) = self.readings.pop_front() {
            self.current = next;
        }
    }
}

impl ClockSource for ScriptedClock {
    fn now(&self) -> Result<ClockTime, ClockError> {
        if self.broken {
            return Err(ClockError::Bus(BusError::NoAcknowledge(0x68)));
        }
        ClockTime::from_unix(self.current).ok_or(ClockError::InvalidTime)
    }

    fn set(&mut self, unix: i64) -> Result<(), ClockError> {
        if unix < 946_684_800 {
            return Err(ClockError::InvalidTime);
        }
        self.sets.push(unix);
        self.current = unix;
        self.readings.clear();
        Ok(())
    }
}

// ── MemoryStore ───────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub saved: Option<Settings>,
    pub saves: usize,
    pub fail: bool,
}

impl SettingsStore for MemoryStore {
    fn load(&mut self) -> Result<Settings, StorageError> {
        self.saved.clone().ok_or(StorageError::NotFound)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Io(BusError::NoAcknowledge(0x57)));
        }
        settings.validate().map_err(StorageError::Rejected)?;
        self.saved = Some(settings.clone());
        self.saves += 1;
        Ok(())
    }
}
