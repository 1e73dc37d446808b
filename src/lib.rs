//! Smart-Green irrigation controller firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod bus;
pub mod config;
pub mod error;
pub mod executor;
pub mod flow;
pub mod orchestrator;
pub mod pins;
pub mod schedule;
pub mod status;

pub mod adapters;
pub mod drivers;
