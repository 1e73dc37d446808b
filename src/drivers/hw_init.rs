//! One-shot hardware initialization.
//!
//! Configures the direct GPIOs (buzzer, flow sensor), installs the flow
//! sensor ISR, and probes the optional I2C devices.  Called once from
//! `main()` before any task is spawned.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::bus::SharedBus;
use crate::config::Capabilities;
use crate::flow::PulseCounter;
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

// ── GPIO ──────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn init_gpio() -> Result<(), HwInitError> {
    let buzzer = gpio_config_t {
        pin_bit_mask: 1u64 << pins::BUZZER_GPIO,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: called once from main() before any task exists.
    let ret = unsafe { gpio_config(&buzzer) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    unsafe { gpio_set_level(pins::BUZZER_GPIO, 0) };

    let flow = gpio_config_t {
        pin_bit_mask: 1u64 << pins::FLOW_METER_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
    };
    let ret = unsafe { gpio_config(&flow) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }

    info!("hw_init: GPIO configured (buzzer={}, flow={})", pins::BUZZER_GPIO, pins::FLOW_METER_GPIO);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_gpio() -> Result<(), HwInitError> {
    info!("hw_init(sim): GPIO init skipped");
    Ok(())
}

// ── Flow sensor ISR ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn flow_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the `&'static PulseCounter` registered below.
    let counter = unsafe { &*(arg as *const PulseCounter) };
    counter.on_edge();
}

/// Route rising edges on the flow pin into `counter`.
#[cfg(target_os = "espidf")]
pub fn init_flow_isr(counter: &'static PulseCounter) -> Result<(), HwInitError> {
    // SAFETY: ESP_ERR_INVALID_STATE means the service is already
    // installed.  The handler only touches atomics in a 'static counter.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        let arg = core::ptr::from_ref(counter).cast_mut().cast::<core::ffi::c_void>();
        let ret = gpio_isr_handler_add(pins::FLOW_METER_GPIO, Some(flow_gpio_isr), arg);
        if ret != ESP_OK as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        gpio_intr_enable(pins::FLOW_METER_GPIO);
    }
    info!("hw_init: flow ISR installed");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_flow_isr(_counter: &'static PulseCounter) -> Result<(), HwInitError> {
    info!("hw_init(sim): flow ISR skipped");
    Ok(())
}

// ── I2C capability probe ──────────────────────────────────────

/// Probe each optional I2C device with an address-only write.
pub fn probe_capabilities<I: I2c>(bus: &SharedBus<I>) -> Capabilities {
    let caps = Capabilities {
        has_rtc: bus.probe(pins::RTC_I2C_ADDR),
        has_eeprom: bus.probe(pins::EEPROM_I2C_ADDR),
        has_display: bus.probe(pins::DISPLAY_I2C_ADDR),
        has_mcp: bus.probe(pins::MCP_I2C_ADDR),
    };
    for (present, name) in [
        (caps.has_rtc, "RTC"),
        (caps.has_eeprom, "EEPROM"),
        (caps.has_display, "display"),
        (caps.has_mcp, "I/O expander"),
    ] {
        if present {
            info!("hw_init: {} found", name);
        } else {
            warn!("hw_init: {} not found", name);
        }
    }
    caps
}
