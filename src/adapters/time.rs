//! Time adapters.
//!
//! - [`RtcClock`] implements [`ClockSource`] on the DS3231, one bus
//!   acquisition per reading.
//! - [`uptime_secs`] is the monotonic fallback used to stamp records when
//!   no RTC is fitted: `esp_timer_get_time()` on ESP-IDF,
//!   `std::time::Instant` on the host.
//! - [`TaskDelay`] is the blocking [`DelayNs`] used by the worker tasks.
//!   On ESP-IDF `std::thread::sleep` yields to FreeRTOS.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::app::ports::{ClockError, ClockSource};
use crate::bus::SharedBus;
use crate::drivers::ds3231::{Ds3231, RtcError};
use crate::schedule::ClockTime;

impl From<RtcError> for ClockError {
    fn from(e: RtcError) -> Self {
        match e {
            RtcError::Bus(b) => Self::Bus(b),
            RtcError::InvalidTime => Self::InvalidTime,
        }
    }
}

pub struct RtcClock<I> {
    bus: SharedBus<I>,
    rtc: Ds3231,
}

impl<I: I2c> RtcClock<I> {
    pub fn new(bus: SharedBus<I>, addr: u8) -> Self {
        Self {
            bus,
            rtc: Ds3231::new(addr),
        }
    }
}

impl<I: I2c> ClockSource for RtcClock<I> {
    fn now(&self) -> Result<ClockTime, ClockError> {
        let unix = self.bus.with(|b| self.rtc.read_unix(&mut b.i2c))?;
        ClockTime::from_unix(unix).ok_or(ClockError::InvalidTime)
    }

    fn set(&mut self, unix: i64) -> Result<(), ClockError> {
        self.bus.with(|b| self.rtc.write_unix(&mut b.i2c, unix))?;
        Ok(())
    }
}

/// Seconds since boot (monotonic).
#[cfg(target_os = "espidf")]
pub fn uptime_secs() -> i64 {
    // SAFETY: reads a free-running hardware timer, no preconditions.
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) / 1_000_000
}

/// Seconds since first call (monotonic).
#[cfg(not(target_os = "espidf"))]
pub fn uptime_secs() -> i64 {
    use std::sync::OnceLock;
    static START: OnceLock<std::time::Instant> = OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs() as i64
}

/// Blocking delay for task context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskDelay;

impl DelayNs for TaskDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(core::time::Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(core::time::Duration::from_millis(u64::from(ms)));
    }
}
