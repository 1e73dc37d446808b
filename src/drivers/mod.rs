//! Peripheral drivers, hardware initialisation and task helpers.

pub mod buzzer;
pub mod ds3231;
pub mod eeprom;
pub mod hw_init;
pub mod mcp23017;
pub mod task_pin;
