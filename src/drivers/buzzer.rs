//! Piezo buzzer on a plain GPIO (active HIGH).
//!
//! On ESP-IDF: drives the pin configured by `hw_init`.
//! On host/test: counts beeps in-memory only.

use embedded_hal::delay::DelayNs;

#[cfg(target_os = "espidf")]
use crate::pins;

/// On and off time of one beep.
pub const BEEP_MS: u32 = 150;

pub struct Buzzer {
    on: bool,
    beeps: u32,
}

impl Default for Buzzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buzzer {
    pub const fn new() -> Self {
        Self { on: false, beeps: 0 }
    }

    /// `count` beeps of [`BEEP_MS`] on / [`BEEP_MS`] off.
    pub fn beep(&mut self, count: u8, delay: &mut impl DelayNs) {
        for _ in 0..count {
            self.set(true);
            delay.delay_ms(BEEP_MS);
            self.set(false);
            delay.delay_ms(BEEP_MS);
            self.beeps = self.beeps.wrapping_add(1);
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Beeps emitted since boot.
    pub fn beeps(&self) -> u32 {
        self.beeps
    }

    fn set(&mut self, on: bool) {
        #[cfg(target_os = "espidf")]
        // SAFETY: pin configured as output once in hw_init; level writes
        // are a single register store.
        unsafe {
            esp_idf_svc::sys::gpio_set_level(pins::BUZZER_GPIO, u32::from(on));
        }
        self.on = on;
    }
}
