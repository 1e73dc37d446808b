//! AT24C32 4 KiB I2C EEPROM (on the DS3231 breakout).
//!
//! Two-byte big-endian memory addresses, 32-byte write pages.  A page
//! write that runs past its page boundary wraps around inside the page,
//! so callers split writes with [`page_chunks`].  After each page write
//! the chip is busy for up to [`WRITE_CYCLE_MS`]; the caller waits that
//! out *after* releasing the bus.

use embedded_hal::i2c::I2c;

use crate::bus::bus_error;
use crate::error::BusError;

pub const EEPROM_SIZE: usize = 4096;
pub const PAGE_SIZE: usize = 32;
pub const WRITE_CYCLE_MS: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct At24c32 {
    addr: u8,
}

impl At24c32 {
    pub const fn new(addr: u8) -> Self {
        Self { addr }
    }

    /// Sequential read starting at `mem_addr`.
    pub fn read<I: I2c>(&self, i2c: &mut I, mem_addr: u16, buf: &mut [u8]) -> Result<(), BusError> {
        i2c.write_read(self.addr, &mem_addr.to_be_bytes(), buf)
            .map_err(|e| bus_error(self.addr, &e))
    }

    /// Write at most one page.  `data` must not cross a page boundary.
    pub fn write_page<I: I2c>(&self, i2c: &mut I, mem_addr: u16, data: &[u8]) -> Result<(), BusError> {
        let offset = mem_addr as usize % PAGE_SIZE;
        if data.len() > PAGE_SIZE - offset || mem_addr as usize + data.len() > EEPROM_SIZE {
            return Err(BusError::Other);
        }
        let mut frame = [0u8; 2 + PAGE_SIZE];
        frame[..2].copy_from_slice(&mem_addr.to_be_bytes());
        frame[2..2 + data.len()].copy_from_slice(data);
        i2c.write(self.addr, &frame[..2 + data.len()])
            .map_err(|e| bus_error(self.addr, &e))
    }
}

/// Split `[start, start + len)` into `(mem_addr, range)` pieces that each
/// stay within one page.  `range` indexes the caller's buffer.
pub fn page_chunks(start: u16, len: usize) -> impl Iterator<Item = (u16, core::ops::Range<usize>)> {
    let mut done = 0usize;
    core::iter::from_fn(move || {
        if done >= len {
            return None;
        }
        let addr = start as usize + done;
        let room = PAGE_SIZE - addr % PAGE_SIZE;
        let take = room.min(len - done);
        let chunk = (addr as u16, done..done + take);
        done += take;
        Some(chunk)
    })
}
