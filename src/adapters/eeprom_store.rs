//! Settings persistence on the AT24C32 EEPROM.
//!
//! Implements [`SettingsStore`].  The record is a small header followed by
//! the postcard-encoded [`Settings`]:
//!
//! ```text
//!  offset  0   2        3         4      6          10
//!          ┌───┬────────┬─────────┬──────┬──────────┬──────────────┐
//!          │SG │version │reserved │ len  │ crc32    │ postcard ... │
//!          └───┴────────┴─────────┴──────┴──────────┴──────────────┘
//! ```
//!
//! - Validation: settings are checked before anything is written.
//! - Bus discipline: every page read or write is its own bus acquisition;
//!   the chip's write cycle is waited out with the bus released.
//! - Wear: pages whose contents already match are not rewritten, so
//!   saving an unchanged record performs no writes at all.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::app::ports::SettingsStore;
use crate::bus::SharedBus;
use crate::config::Settings;
use crate::drivers::eeprom::{At24c32, EEPROM_SIZE, WRITE_CYCLE_MS, page_chunks};
use crate::error::StorageError;

const MAGIC: [u8; 2] = *b"SG";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 10;

/// Start of the settings record; the region runs to the end of the chip.
pub const SETTINGS_BASE: u16 = 0x0000;

pub struct EepromStore<I, D> {
    bus: SharedBus<I>,
    chip: At24c32,
    delay: D,
    base: u16,
}

impl<I: I2c, D: DelayNs> EepromStore<I, D> {
    pub fn new(bus: SharedBus<I>, addr: u8, delay: D) -> Self {
        Self {
            bus,
            chip: At24c32::new(addr),
            delay,
            base: SETTINGS_BASE,
        }
    }

    fn capacity(&self) -> usize {
        EEPROM_SIZE - self.base as usize
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let addr = self.base + offset as u16;
        self.bus
            .with(|b| self.chip.read(&mut b.i2c, addr, buf))
            .map_err(StorageError::Io)
    }

    /// Raw record bytes (header included), as last persisted.
    pub fn read_record(&self) -> Result<Vec<u8>, StorageError> {
        let mut header = [0u8; HEADER_LEN];
        self.read_at(0, &mut header)?;
        if header[..2] != MAGIC {
            return Err(StorageError::NotFound);
        }
        if header[2] != FORMAT_VERSION {
            warn!("settings format v{} not understood", header[2]);
            return Err(StorageError::Corrupted);
        }
        let len = u16::from_le_bytes([header[4], header[5]]) as usize;
        if HEADER_LEN + len > self.capacity() {
            return Err(StorageError::Corrupted);
        }
        let mut record = vec![0u8; HEADER_LEN + len];
        record[..HEADER_LEN].copy_from_slice(&header);
        self.read_at(HEADER_LEN, &mut record[HEADER_LEN..])?;
        Ok(record)
    }

    fn write_record(&mut self, record: &[u8]) -> Result<(), StorageError> {
        let mut written = 0usize;
        for (addr, range) in page_chunks(self.base, record.len()) {
            let wanted = &record[range];
            let mut current = [0u8; crate::drivers::eeprom::PAGE_SIZE];
            let current = &mut current[..wanted.len()];

            let chip = self.chip;
            let changed = self.bus.with(|b| -> Result<bool, StorageError> {
                chip.read(&mut b.i2c, addr, current)?;
                if current == wanted {
                    return Ok(false);
                }
                chip.write_page(&mut b.i2c, addr, wanted)?;
                Ok(true)
            })?;

            if changed {
                // Write cycle runs with the bus released.
                self.delay.delay_ms(WRITE_CYCLE_MS);
                written += 1;
            }
        }
        debug!("settings record: {} byte(s), {} page(s) rewritten", record.len(), written);
        Ok(())
    }
}

/// Header + postcard body for `settings`.
pub fn encode_record(settings: &Settings) -> Result<Vec<u8>, StorageError> {
    let body = postcard::to_allocvec(settings).map_err(|_| StorageError::TooLarge)?;
    let len = u16::try_from(body.len()).map_err(|_| StorageError::TooLarge)?;
    let mut record = Vec::with_capacity(HEADER_LEN + body.len());
    record.extend_from_slice(&MAGIC);
    record.push(FORMAT_VERSION);
    record.push(0);
    record.extend_from_slice(&len.to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    record.extend_from_slice(&body);
    Ok(record)
}

/// Inverse of [`encode_record`].
pub fn decode_record(record: &[u8]) -> Result<Settings, StorageError> {
    if record.len() < HEADER_LEN || record[..2] != MAGIC {
        return Err(StorageError::NotFound);
    }
    let len = u16::from_le_bytes([record[4], record[5]]) as usize;
    let body = record.get(HEADER_LEN..HEADER_LEN + len).ok_or(StorageError::Corrupted)?;
    let crc = u32::from_le_bytes([record[6], record[7], record[8], record[9]]);
    if crc32fast::hash(body) != crc {
        return Err(StorageError::Corrupted);
    }
    postcard::from_bytes(body).map_err(|_| StorageError::Corrupted)
}

impl<I: I2c, D: DelayNs> SettingsStore for EepromStore<I, D> {
    fn load(&mut self) -> Result<Settings, StorageError> {
        let record = self.read_record()?;
        let settings = decode_record(&record)?;
        settings.validate().map_err(StorageError::Rejected)?;
        info!("settings loaded ({} bytes)", record.len());
        Ok(settings)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), StorageError> {
        settings.validate().map_err(StorageError::Rejected)?;
        let record = encode_record(settings)?;
        if record.len() > self.capacity() {
            return Err(StorageError::TooLarge);
        }
        self.write_record(&record)
    }
}
