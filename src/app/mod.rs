//! Application core: settings mutations, console commands and the
//! administrative JSON contract.
//!
//! All interaction with hardware happens through the **port traits** in
//! [`ports`], keeping this layer testable without real peripherals.

pub mod commands;
pub mod payload;
pub mod ports;
pub mod service;
