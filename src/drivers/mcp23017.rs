//! MCP23017 16-bit I/O expander driving the valve and pump relays.
//!
//! All 16 pins are outputs.  The relay board is active LOW: a cleared
//! latch bit energizes the relay.  The driver keeps a shadow of the
//! output latch so single-pin changes are one register write and the
//! current state can be reported without a bus read.
//!
//! The driver does not own the I2C peripheral; every call borrows it from
//! the [`SharedBus`](crate::bus::SharedBus) closure that holds the lock.

use embedded_hal::i2c::I2c;

use crate::bus::bus_error;
use crate::error::BusError;
use crate::pins::EXPANDER_PIN_COUNT;

const IODIRA: u8 = 0x00;
const OLATA: u8 = 0x14;

/// Latch value with every relay released.
const ALL_RELEASED: u16 = 0xFFFF;

#[derive(Debug, Clone)]
pub struct Mcp23017 {
    addr: u8,
    latch: u16,
}

impl Mcp23017 {
    pub const fn new(addr: u8) -> Self {
        Self {
            addr,
            latch: ALL_RELEASED,
        }
    }

    /// Release every relay, then switch both ports to output.
    ///
    /// The latch is written before IODIR so the pins never drive LOW in
    /// between.
    pub fn init<I: I2c>(&mut self, i2c: &mut I) -> Result<(), BusError> {
        self.latch = ALL_RELEASED;
        self.flush(i2c)?;
        i2c.write(self.addr, &[IODIRA, 0x00, 0x00])
            .map_err(|e| bus_error(self.addr, &e))
    }

    /// Energize (`true`) or release one output.
    pub fn set_pin<I: I2c>(&mut self, i2c: &mut I, pin: u8, on: bool) -> Result<(), BusError> {
        if pin >= EXPANDER_PIN_COUNT {
            return Err(BusError::InvalidOutput(pin));
        }
        let previous = self.latch;
        if on {
            self.latch &= !(1 << pin);
        } else {
            self.latch |= 1 << pin;
        }
        self.flush(i2c).inspect_err(|_| self.latch = previous)
    }

    /// Energize or release every output in one transaction.
    pub fn set_all<I: I2c>(&mut self, i2c: &mut I, on: bool) -> Result<(), BusError> {
        let previous = self.latch;
        self.latch = if on { 0x0000 } else { ALL_RELEASED };
        self.flush(i2c).inspect_err(|_| self.latch = previous)
    }

    pub fn is_on(&self, pin: u8) -> bool {
        pin < EXPANDER_PIN_COUNT && self.latch & (1 << pin) == 0
    }

    /// Bitmap of energized outputs (bit set = on).
    pub fn energized(&self) -> u16 {
        !self.latch
    }

    /// OLATA / OLATB in one sequential write.
    fn flush<I: I2c>(&self, i2c: &mut I) -> Result<(), BusError> {
        let [lo, hi] = self.latch.to_le_bytes();
        i2c.write(self.addr, &[OLATA, lo, hi])
            .map_err(|e| bus_error(self.addr, &e))
    }
}
