//! DS3231 real-time clock.
//!
//! Time registers 0x00..=0x06 hold BCD seconds, minutes, hours (24 h),
//! day-of-week, date, month and two-digit year.  The chip keeps local
//! civil time; no timezone is applied anywhere.

use embedded_hal::i2c::I2c;
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::bus::bus_error;
use crate::error::BusError;

const REG_SECONDS: u8 = 0x00;
const HOUR_12H_FLAG: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    Bus(BusError),
    /// Registers did not hold a valid date (e.g. oscillator never set).
    InvalidTime,
}

impl From<BusError> for RtcError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ds3231 {
    addr: u8,
}

impl Ds3231 {
    pub const fn new(addr: u8) -> Self {
        Self { addr }
    }

    /// Current time as local epoch seconds.
    pub fn read_unix<I: I2c>(&self, i2c: &mut I) -> Result<i64, RtcError> {
        let mut regs = [0u8; 7];
        i2c.write_read(self.addr, &[REG_SECONDS], &mut regs)
            .map_err(|e| bus_error(self.addr, &e))?;
        decode(&regs).ok_or(RtcError::InvalidTime)
    }

    pub fn write_unix<I: I2c>(&self, i2c: &mut I, unix: i64) -> Result<(), RtcError> {
        let regs = encode(unix).ok_or(RtcError::InvalidTime)?;
        let mut frame = [0u8; 8];
        frame[0] = REG_SECONDS;
        frame[1..].copy_from_slice(&regs);
        i2c.write(self.addr, &frame)
            .map_err(|e| bus_error(self.addr, &e).into())
    }
}

fn bcd_to_bin(v: u8) -> u8 {
    (v >> 4) * 10 + (v & 0x0F)
}

fn bin_to_bcd(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

fn decode(regs: &[u8; 7]) -> Option<i64> {
    let second = bcd_to_bin(regs[0] & 0x7F);
    let minute = bcd_to_bin(regs[1] & 0x7F);
    let hour = if regs[2] & HOUR_12H_FLAG != 0 {
        let h12 = bcd_to_bin(regs[2] & 0x1F) % 12;
        if regs[2] & 0x20 != 0 { h12 + 12 } else { h12 }
    } else {
        bcd_to_bin(regs[2] & 0x3F)
    };
    let day = bcd_to_bin(regs[4] & 0x3F);
    let month = Month::try_from(bcd_to_bin(regs[5] & 0x1F)).ok()?;
    let century = if regs[5] & 0x80 != 0 { 2100 } else { 2000 };
    let year = century + i32::from(bcd_to_bin(regs[6]));

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

fn encode(unix: i64) -> Option<[u8; 7]> {
    let dt = time::OffsetDateTime::from_unix_timestamp(unix).ok()?;
    let year = dt.year();
    if !(2000..2200).contains(&year) {
        return None;
    }
    let century_flag = if year >= 2100 { 0x80 } else { 0x00 };
    Some([
        bin_to_bcd(dt.second()),
        bin_to_bcd(dt.minute()),
        bin_to_bcd(dt.hour()),
        // Register counts 1..=7; Sunday = 1.
        dt.weekday().number_from_sunday(),
        bin_to_bcd(dt.day()),
        bin_to_bcd(u8::from(dt.month())) | century_flag,
        bin_to_bcd((year % 100) as u8),
    ])
}
