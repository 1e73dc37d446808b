//! GPIO / bus assignments for the Smart-Green controller board.
//!
//! Single source of truth; every driver references this module rather than
//! hard-coding pin numbers or I2C addresses.

// ---------------------------------------------------------------------------
// I2C bus (shared by RTC, EEPROM, display and I/O expander)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
pub const I2C_BAUDRATE_HZ: u32 = 400_000;

/// DS3231 real-time clock.
pub const RTC_I2C_ADDR: u8 = 0x68;
/// AT24C32 EEPROM on the DS3231 breakout.
pub const EEPROM_I2C_ADDR: u8 = 0x57;
/// SSD1306 128x32 OLED.
pub const DISPLAY_I2C_ADDR: u8 = 0x3C;
/// MCP23017 16-bit I/O expander driving the valve/pump relays.
pub const MCP_I2C_ADDR: u8 = 0x20;

// ---------------------------------------------------------------------------
// Expander output map (relay board, active LOW)
// ---------------------------------------------------------------------------

/// Number of valve channels wired to the expander (outputs 0..VALVE_COUNT).
pub const VALVE_COUNT: u8 = 12;
/// Expander output driving the pump relay.
pub const PUMP_OUTPUT: u8 = 12;
/// Total pin count of the expander.
pub const EXPANDER_PIN_COUNT: u8 = 16;

// ---------------------------------------------------------------------------
// Direct GPIO
// ---------------------------------------------------------------------------

/// Piezo buzzer, active HIGH.
pub const BUZZER_GPIO: i32 = 32;
/// YF-S401 hall-effect flow sensor, pulse output, interrupt-driven.
pub const FLOW_METER_GPIO: i32 = 33;
