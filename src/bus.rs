//! The shared I2C bus and the mutex that serializes it.
//!
//! RTC, EEPROM, display and the relay expander all hang off one I2C bus.
//! Every task that touches any of them goes through [`SharedBus::with`],
//! which holds the lock for exactly one closure call.  The guard is
//! dropped when the closure returns, on every path including `?` and
//! early returns inside it.
//!
//! Callers must never sleep inside the closure: settle delays, EEPROM
//! write cycles and sampling windows all happen between acquisitions.

use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use crate::drivers::mcp23017::Mcp23017;
use crate::error::BusError;

/// Everything that lives behind the bus mutex.
pub struct BusDevices<I> {
    pub i2c: I,
    pub expander: Mcp23017,
}

/// Cloneable handle to the bus mutex.
pub struct SharedBus<I> {
    inner: Arc<Mutex<BusDevices<I>>>,
}

impl<I> Clone for SharedBus<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: I2c> SharedBus<I> {
    pub fn new(i2c: I, expander: Mcp23017) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusDevices { i2c, expander })),
        }
    }

    /// Run `f` with exclusive access to the bus.
    ///
    /// A panic in another holder poisons the mutex; the devices carry no
    /// invariant a half-finished transaction could break, so the guard is
    /// recovered rather than propagated.
    pub fn with<R>(&self, f: impl FnOnce(&mut BusDevices<I>) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Whether some task currently holds the bus.
    pub fn is_held(&self) -> bool {
        matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Address-only probe: an empty write that a present device ACKs.
    pub fn probe(&self, addr: u8) -> bool {
        self.with(|bus| bus.i2c.write(addr, &[]).is_ok())
    }
}

/// Map an `embedded-hal` I2C error onto the firmware taxonomy.
pub fn bus_error(addr: u8, err: &impl embedded_hal::i2c::Error) -> BusError {
    match err.kind() {
        ErrorKind::NoAcknowledge(_) => BusError::NoAcknowledge(addr),
        ErrorKind::ArbitrationLoss | ErrorKind::Bus => BusError::Arbitration,
        _ => BusError::Other,
    }
}
