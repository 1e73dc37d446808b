//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                  |
//! |----------------|--------------------|------------------------------|
//! | `hardware`     | ActuatorBus        | MCP23017 relay expander      |
//! | `eeprom_store` | SettingsStore      | AT24C32 EEPROM               |
//! | `time`         | ClockSource        | DS3231 RTC                   |
//! | `log_sink`     | WateringLogger     | Serial log output + history  |
//! | `device_id`    |                    | Factory MAC (eFuse)          |
//! | `sim_i2c`      | `embedded_hal` I2c | In-memory devices (host)     |

pub mod device_id;
pub mod eeprom_store;
pub mod hardware;
pub mod log_sink;
#[cfg(not(target_os = "espidf"))]
pub mod sim_i2c;
pub mod time;
