//! Hardware adapter bridging the relay expander to the [`ActuatorBus`] port.
//!
//! Every port call takes the bus mutex for exactly one expander
//! transaction and releases it before returning, so the executor's
//! settle delays always run with the bus free for the display and
//! console tasks.

use embedded_hal::i2c::I2c;

use crate::app::ports::{ActuatorBus, OutputLevel};
use crate::bus::SharedBus;
use crate::error::BusError;

/// [`ActuatorBus`] over the shared I2C bus.
pub struct BusActuators<I> {
    bus: SharedBus<I>,
}

impl<I: I2c> BusActuators<I> {
    pub fn new(bus: SharedBus<I>) -> Self {
        Self { bus }
    }
}

impl<I: I2c> ActuatorBus for BusActuators<I> {
    fn set_output(&mut self, index: u8, level: OutputLevel) -> Result<(), BusError> {
        self.bus.with(|b| b.expander.set_pin(&mut b.i2c, index, level.is_on()))
    }

    fn set_all_outputs(&mut self, level: OutputLevel) -> Result<(), BusError> {
        self.bus.with(|b| b.expander.set_all(&mut b.i2c, level.is_on()))
    }

    fn output_state(&self) -> u16 {
        self.bus.with(|b| b.expander.energized())
    }
}
