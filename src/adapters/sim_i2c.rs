//! In-memory I2C bus for host builds.
//!
//! Models the devices the controller talks to closely enough for the
//! drivers above it to run unchanged: an MCP23017 register file, an
//! AT24C32 with 32-byte page wrap, a DS3231 register file that does not
//! tick, and an ACK-only display stub.
//! Devices can be removed and transactions failed on demand.

use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::drivers::eeprom::{EEPROM_SIZE, PAGE_SIZE};
use crate::pins;

const MCP_REGISTER_COUNT: usize = 0x16;
const RTC_REGISTER_COUNT: usize = 0x13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimI2cError(ErrorKind);

impl i2c::Error for SimI2cError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct SimI2c {
    mcp: Option<[u8; MCP_REGISTER_COUNT]>,
    mcp_pointer: usize,
    eeprom: Option<Vec<u8>>,
    eeprom_pointer: usize,
    rtc: Option<[u8; RTC_REGISTER_COUNT]>,
    rtc_pointer: usize,
    display: bool,
    fail_next: usize,
    transactions: usize,
}

impl SimI2c {
    /// No devices on the bus.
    pub fn empty() -> Self {
        Self {
            mcp: None,
            mcp_pointer: 0,
            eeprom: None,
            eeprom_pointer: 0,
            rtc: None,
            rtc_pointer: 0,
            display: false,
            fail_next: 0,
            transactions: 0,
        }
    }

    /// Every optional device fitted; EEPROM blank (0xFF).
    pub fn fully_populated() -> Self {
        let mut sim = Self::empty();
        // Power-on state: IODIR all inputs, everything else zero.
        let mut regs = [0u8; MCP_REGISTER_COUNT];
        regs[0x00] = 0xFF;
        regs[0x01] = 0xFF;
        sim.mcp = Some(regs);
        sim.eeprom = Some(vec![0xFF; EEPROM_SIZE]);
        // 2024-01-01 00:00:00, a Monday.
        let mut rtc = [0u8; RTC_REGISTER_COUNT];
        rtc[..7].copy_from_slice(&[0x00, 0x00, 0x00, 2, 0x01, 0x01, 0x24]);
        sim.rtc = Some(rtc);
        sim.display = true;
        sim
    }

    pub fn without_mcp(mut self) -> Self {
        self.mcp = None;
        self
    }

    pub fn without_eeprom(mut self) -> Self {
        self.eeprom = None;
        self
    }

    pub fn without_rtc(mut self) -> Self {
        self.rtc = None;
        self
    }

    /// Fail the next `n` transactions with a NACK.
    pub fn fail_next(&mut self, n: usize) {
        self.fail_next = n;
    }

    pub fn transactions(&self) -> usize {
        self.transactions
    }

    /// Raw MCP23017 register value.
    pub fn mcp_register(&self, reg: u8) -> Option<u8> {
        self.mcp.as_ref().map(|r| r[reg as usize % MCP_REGISTER_COUNT])
    }

    pub fn eeprom_contents(&self) -> Option<&[u8]> {
        self.eeprom.as_deref()
    }

    fn present(&self, addr: u8) -> bool {
        match addr {
            pins::MCP_I2C_ADDR => self.mcp.is_some(),
            pins::EEPROM_I2C_ADDR => self.eeprom.is_some(),
            pins::RTC_I2C_ADDR => self.rtc.is_some(),
            pins::DISPLAY_I2C_ADDR => self.display,
            _ => false,
        }
    }

    fn mcp_write(&mut self, bytes: &[u8]) {
        let Some(regs) = self.mcp.as_mut() else {
            return;
        };
        let Some((&reg, data)) = bytes.split_first() else {
            return;
        };
        self.mcp_pointer = reg as usize % MCP_REGISTER_COUNT;
        for &b in data {
            regs[self.mcp_pointer] = b;
            self.mcp_pointer = (self.mcp_pointer + 1) % MCP_REGISTER_COUNT;
        }
    }

    fn mcp_read(&mut self, buf: &mut [u8]) {
        let Some(regs) = self.mcp.as_ref() else {
            return;
        };
        for b in buf {
            *b = regs[self.mcp_pointer];
            self.mcp_pointer = (self.mcp_pointer + 1) % MCP_REGISTER_COUNT;
        }
    }

    fn rtc_write(&mut self, bytes: &[u8]) {
        let Some(regs) = self.rtc.as_mut() else {
            return;
        };
        let Some((&reg, data)) = bytes.split_first() else {
            return;
        };
        self.rtc_pointer = reg as usize % RTC_REGISTER_COUNT;
        for &b in data {
            regs[self.rtc_pointer] = b;
            self.rtc_pointer = (self.rtc_pointer + 1) % RTC_REGISTER_COUNT;
        }
    }

    fn rtc_read(&mut self, buf: &mut [u8]) {
        let Some(regs) = self.rtc.as_ref() else {
            return;
        };
        for b in buf {
            *b = regs[self.rtc_pointer];
            self.rtc_pointer = (self.rtc_pointer + 1) % RTC_REGISTER_COUNT;
        }
    }

    fn eeprom_write(&mut self, bytes: &[u8]) {
        let Some(mem) = self.eeprom.as_mut() else {
            return;
        };
        if bytes.len() < 2 {
            return;
        }
        let start = ((usize::from(bytes[0]) << 8) | usize::from(bytes[1])) % EEPROM_SIZE;
        self.eeprom_pointer = start;
        let page_base = start - start % PAGE_SIZE;
        for (i, &b) in bytes[2..].iter().enumerate() {
            // Writes past the page boundary wrap to its start.
            let offset = (start % PAGE_SIZE + i) % PAGE_SIZE;
            mem[page_base + offset] = b;
        }
    }

    fn eeprom_read(&mut self, buf: &mut [u8]) {
        let Some(mem) = self.eeprom.as_ref() else {
            return;
        };
        for b in buf {
            *b = mem[self.eeprom_pointer];
            self.eeprom_pointer = (self.eeprom_pointer + 1) % EEPROM_SIZE;
        }
    }
}

impl ErrorType for SimI2c {
    type Error = SimI2cError;
}

impl I2c for SimI2c {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        self.transactions += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(SimI2cError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)));
        }
        if !self.present(address) {
            return Err(SimI2cError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)));
        }
        for op in operations {
            match (address, op) {
                (pins::MCP_I2C_ADDR, Operation::Write(bytes)) => self.mcp_write(bytes),
                (pins::MCP_I2C_ADDR, Operation::Read(buf)) => self.mcp_read(buf),
                (pins::EEPROM_I2C_ADDR, Operation::Write(bytes)) => self.eeprom_write(bytes),
                (pins::EEPROM_I2C_ADDR, Operation::Read(buf)) => self.eeprom_read(buf),
                (pins::RTC_I2C_ADDR, Operation::Write(bytes)) => self.rtc_write(bytes),
                (pins::RTC_I2C_ADDR, Operation::Read(buf)) => self.rtc_read(buf),
                (_, Operation::Read(buf)) => buf.fill(0),
                (_, Operation::Write(_)) => {}
            }
        }
        Ok(())
    }
}
