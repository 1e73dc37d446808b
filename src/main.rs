//! Smart-Green firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │  BusActuators     EepromStore      RtcClock     HistoryLogger │
//! │  (ActuatorBus)    (SettingsStore)  (ClockSource) (Logger)     │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ──────────────────      │
//! │                                                              │
//! │  WateringExecutor · AlarmScheduler · AppService              │
//! │                                                              │
//! │  Tasks: telemetry(2) console(3) supervisor(4) executor(5)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::io::BufRead;

use anyhow::{Result, anyhow};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::prelude::*;
use esp_idf_svc::hal::reset::restart;
use log::{error, info, warn};

use smartgreen::adapters::device_id;
use smartgreen::adapters::eeprom_store::EepromStore;
use smartgreen::adapters::time::{RtcClock, TaskDelay};
use smartgreen::app::ports::{ClockSource, SettingsStore};
use smartgreen::app::service::{AppService, Reply};
use smartgreen::bus::SharedBus;
use smartgreen::config::{Settings, WateringConfig};
use smartgreen::drivers::hw_init;
use smartgreen::drivers::mcp23017::Mcp23017;
use smartgreen::drivers::task_pin::{Core, spawn_task};
use smartgreen::error::StorageError;
use smartgreen::orchestrator::{self, SharedState, priority};
use smartgreen::pins;

const CONSOLE_STACK_KB: usize = 10;
const CONSOLE_POLL_MS: u32 = 50;
const RESTART_GRACE_MS: u32 = 500;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    info!("Smart-Green v{}", env!("CARGO_PKG_VERSION"));

    hw_init::init_gpio()?;

    // ── 2. Shared I2C bus + capability probe ──────────────────
    let peripherals = Peripherals::take()?;
    let i2c_config = I2cConfig::new().baudrate(pins::I2C_BAUDRATE_HZ.Hz());
    // SDA / SCL must match pins::I2C_SDA_GPIO / pins::I2C_SCL_GPIO.
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &i2c_config,
    )?;
    let bus = SharedBus::new(i2c, Mcp23017::new(pins::MCP_I2C_ADDR));

    let capabilities = hw_init::probe_capabilities(&bus);
    if !capabilities.has_eeprom {
        error!("EEPROM not found, settings cannot persist; restarting");
        reboot();
    }

    // ── 3. Settings ───────────────────────────────────────────
    let mut store = EepromStore::new(bus.clone(), pins::EEPROM_I2C_ADDR, TaskDelay);
    let mut settings = match store.load() {
        Ok(s) => s,
        Err(e @ (StorageError::NotFound | StorageError::Corrupted | StorageError::Rejected(_))) => {
            warn!("stored settings unusable ({}), using defaults", e);
            Settings::default()
        }
        Err(e) => {
            error!("EEPROM read failed ({}); restarting", e);
            reboot();
        }
    };

    let mac = device_id::read_mac();
    settings.device_id = device_id::device_id(&mac);
    if settings.hostname == Settings::default().hostname {
        settings.hostname = device_id::hostname(&mac);
    }
    settings.capabilities = capabilities;
    info!("Device ID: {} (hostname: {})", settings.device_id, settings.hostname);
    if let Err(e) = store.save(&settings) {
        warn!("settings not persisted at boot: {}", e);
    }

    // ── 4. Outputs to a known state ───────────────────────────
    if capabilities.has_mcp {
        if let Err(e) = bus.with(|b| b.expander.init(&mut b.i2c)) {
            warn!("I/O expander init failed: {}", e);
        }
    }

    // ── 5. Shared state, ISR, tasks ───────────────────────────
    let state: &'static SharedState<I2cDriver<'static>> = Box::leak(Box::new(SharedState::new(
        bus.clone(),
        settings,
        WateringConfig::default(),
    )));
    hw_init::init_flow_isr(&state.pulses)?;

    let rtc = || capabilities.has_rtc.then(|| RtcClock::new(bus.clone(), pins::RTC_I2C_ADDR));
    orchestrator::spawn_workers(state, rtc())?;

    let app = AppService::new(state, store, rtc());
    let console = spawn_task(
        Core::App,
        priority::CONSOLE,
        CONSOLE_STACK_KB,
        "console\0",
        move || console_loop(app),
    )?;

    info!("System ready.");
    console.join().map_err(|_| anyhow!("console task panicked"))
}

/// Line-oriented command console on stdin / stdout.
fn console_loop<I, S, C>(mut app: AppService<'static, I, S, C>)
where
    I: I2c,
    S: SettingsStore,
    C: ClockSource,
{
    let stdin = std::io::stdin();
    let mut delay = TaskDelay;
    let mut line = String::new();

    loop {
        // The UART VFS is non-blocking: partial input stays in `line`.
        match stdin.lock().read_line(&mut line) {
            Ok(n) if n > 0 && line.ends_with('\n') => {}
            _ => {
                delay.delay_ms(CONSOLE_POLL_MS);
                continue;
            }
        }

        if !line.trim().is_empty() {
            match app.handle_line(&line, &mut delay) {
                Reply::Text(text) => println!("{text}"),
                Reply::Restart => {
                    info!("restart requested from console");
                    reboot();
                }
            }
        }
        line.clear();
    }
}

fn reboot() -> ! {
    TaskDelay.delay_ms(RESTART_GRACE_MS);
    restart()
}
