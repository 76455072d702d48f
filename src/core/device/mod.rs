//! Rig devices
//!
//! The rig has two serial devices. Each is found by its USB vendor/product id
//! (paths change on re-enumeration) and driven through a [`DeviceLink`].

mod link;
mod locator;

pub use link::{DeviceLink, LinkStatus};
pub use locator::DeviceLocator;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a device plays on the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// PLC driving the rig, reached through a USB-serial converter on its TX1/RX1
    Controllino,
    /// Microcontroller measuring peak motor current
    CurrentLogger,
}

impl DeviceRole {
    /// Both roles in poll order (PLC first)
    pub fn all() -> &'static [DeviceRole] {
        &[DeviceRole::Controllino, DeviceRole::CurrentLogger]
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceRole::Controllino => "controllino",
            DeviceRole::CurrentLogger => "current-logger",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// USB vendor/product id pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
}

impl DeviceIdentity {
    /// Create an identity
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}
