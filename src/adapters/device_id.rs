//! Device identity derived from the ESP32 factory MAC address.
//!
//! `SG-XXYYZZ` from the last three MAC bytes, uppercase.  The default
//! hostname is the lowercase `smartgreen-xxyyzz`.  Both are stable across
//! reboots (eFuse MAC) and are written into [`Settings`](crate::config::Settings)
//! at boot.

use core::fmt::Write;

use crate::config::{DEVICE_ID_CAPACITY, HOSTNAME_CAPACITY};

pub type DeviceIdString = heapless::String<DEVICE_ID_CAPACITY>;
pub type HostnameString = heapless::String<HOSTNAME_CAPACITY>;

pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the six bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a fixed MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x24, 0x0A, 0xC4, 0x5E, 0x1F, 0x07]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "SG-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

pub fn hostname(mac: &MacAddress) -> HostnameString {
    let mut name = HostnameString::new();
    let _ = write!(name, "smartgreen-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}
