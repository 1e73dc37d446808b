//! Unified error types for the Smart-Green firmware.
//!
//! One `Error` enum every subsystem can convert into, so the supervisor
//! and the console handlers deal with failures uniformly.  All variants
//! are `Copy`: errors travel through the executor and the status path
//! without allocation.
//!
//! The variants follow the failure taxonomy of the controller:
//!
//! | Kind                | Variant        | Handling                          |
//! |---------------------|----------------|-----------------------------------|
//! | capability absent   | `Capability`   | flag checked, feature degraded    |
//! | transient I/O       | `Bus`          | retried at the next poll          |
//! | data validation     | `Validation`   | rejected, settings untouched      |
//! | resource exhaustion | (status drop)  | logged in `status`, never raised  |
//! | unrecoverable       | `Storage`      | boot halts and restarts           |

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A transaction on the shared I2C bus failed.
    Bus(BusError),
    /// An optional device required for the operation is not fitted.
    Capability(CapabilityError),
    /// Externally supplied data failed validation.
    Validation(ValidationError),
    /// Persistent settings could not be read or written.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Capability(e) => write!(f, "capability: {e}"),
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The addressed device did not acknowledge.
    NoAcknowledge(u8),
    /// Arbitration lost or bus stuck.
    Arbitration,
    /// Output index outside the expander's pin range.
    InvalidOutput(u8),
    /// Any other low-level I2C failure.
    Other,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAcknowledge(addr) => write!(f, "no ACK from 0x{addr:02X}"),
            Self::Arbitration => write!(f, "arbitration lost"),
            Self::InvalidOutput(idx) => write!(f, "invalid output index {idx}"),
            Self::Other => write!(f, "I2C transaction failed"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Capability errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityError {
    /// MCP23017 I/O expander (valves + pump) missing.
    NoActuatorBus,
    /// DS3231 real-time clock missing.
    NoRtc,
    /// AT24C32 EEPROM missing.
    NoEeprom,
    /// SSD1306 display missing.
    NoDisplay,
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActuatorBus => write!(f, "I/O expander not present"),
            Self::NoRtc => write!(f, "RTC not present"),
            Self::NoEeprom => write!(f, "EEPROM not present"),
            Self::NoDisplay => write!(f, "display not present"),
        }
    }
}

impl From<CapabilityError> for Error {
    fn from(e: CapabilityError) -> Self {
        Self::Capability(e)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Rejections of administrative payloads.  The `&'static str` names the
/// offending field so the console can echo it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Payload is not well-formed JSON for the expected shape.
    Malformed,
    /// More entries than the fixed table holds.
    TooManyEntries { max: usize },
    /// A field is outside its permitted range.
    OutOfRange(&'static str),
    /// Two plants address the same valve.
    DuplicateValve(u8),
    /// Remote settings are not newer than the local copy.
    Stale,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed payload"),
            Self::TooManyEntries { max } => write!(f, "too many entries (max {max})"),
            Self::OutOfRange(field) => write!(f, "{field} out of range"),
            Self::DuplicateValve(id) => write!(f, "valve {id} assigned twice"),
            Self::Stale => write!(f, "remote settings are not newer"),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// No settings record has been written yet (blank EEPROM).
    NotFound,
    /// Header or checksum mismatch.
    Corrupted,
    /// Encoded settings exceed the reserved EEPROM region.
    TooLarge,
    /// Settings failed validation and were not written.
    Rejected(ValidationError),
    /// The storage device did not respond.
    Io(BusError),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no stored settings"),
            Self::Corrupted => write!(f, "stored settings corrupted"),
            Self::TooLarge => write!(f, "settings blob too large"),
            Self::Rejected(e) => write!(f, "rejected: {e}"),
            Self::Io(e) => write!(f, "I/O: {e}"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<BusError> for StorageError {
    fn from(e: BusError) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
