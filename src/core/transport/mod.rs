//! Serial transport layer
//!
//! Separates port enumeration and line-oriented reads from the device links so
//! that a link can be driven by real hardware or by a test double.

mod framing;
mod serial;

pub use framing::LineBuffer;
pub use serial::{SerialConfig, SerialParity, SerialPortLine, SystemSerial};

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port vanished between enumeration and open
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Port could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The operating system refused to list serial ports
    #[error("Port enumeration failed: {0}")]
    EnumerationFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Device closed the connection
    #[error("Disconnected")]
    Disconnected,
}

/// Bus a serial interface is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// USB CDC or USB-serial converter
    Usb,
    /// PCI serial card
    Pci,
    /// Bluetooth SPP
    Bluetooth,
    /// Anything else (on-board UART, pseudo terminal)
    Unknown,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb => write!(f, "USB"),
            Self::Pci => write!(f, "PCI"),
            Self::Bluetooth => write!(f, "Bluetooth"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One entry of the live serial interface list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Interface path (e.g. `/dev/ttyUSB0`, `COM3`)
    pub name: String,
    /// Bus type
    pub kind: PortKind,
    /// USB vendor id
    pub vid: Option<u16>,
    /// USB product id
    pub pid: Option<u16>,
    /// USB serial number
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl PortInfo {
    /// Port with no USB identity
    pub fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: PortKind::Unknown,
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    /// USB port with the given identity
    pub fn usb(name: &str, vid: u16, pid: u16) -> Self {
        Self {
            kind: PortKind::Usb,
            vid: Some(vid),
            pid: Some(pid),
            ..Self::unknown(name)
        }
    }

    /// Whether this port reports the given vendor/product pair
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == Some(vid) && self.pid == Some(pid)
    }
}

/// Access to the machine's serial interfaces
#[cfg_attr(test, mockall::automock)]
pub trait SerialBackend {
    /// Enumerate attached serial interfaces at call time
    fn available_ports(&self) -> Result<Vec<PortInfo>, TransportError>;

    /// Open an interface for line-oriented, non-blocking reads
    fn open(&self, path: &str, config: &SerialConfig) -> Result<Box<dyn SerialLine>, TransportError>;
}

/// An open connection that yields newline-terminated frames
#[cfg_attr(test, mockall::automock)]
pub trait SerialLine: Send {
    /// Read one complete line if one is available.
    ///
    /// Returns `Ok(None)` when no complete line has arrived yet. Never blocks.
    fn read_line(&mut self) -> Result<Option<String>, TransportError>;
}
