//! Serial port transport implementation

use super::{LineBuffer, PortInfo, PortKind, SerialBackend, SerialLine, TransportError};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::io::Read;
use std::time::Duration;

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            other => Err(format!("unknown parity: {other}")),
        }
    }
}

/// Line parameters shared by both rig devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
        }
    }
}

impl SerialConfig {
    /// Short form such as `115200 baud (8N1)`
    pub fn describe(&self) -> String {
        format!(
            "{} baud ({}{}{})",
            self.baud_rate,
            self.data_bits,
            match self.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.stop_bits
        )
    }

    fn data_bits(&self) -> DataBits {
        match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> StopBits {
        match self.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        }
    }

    fn parity(&self) -> Parity {
        match self.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        }
    }
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                kind: PortKind::Usb,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number,
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            SerialPortType::PciPort => Self {
                kind: PortKind::Pci,
                ..Self::unknown(&info.port_name)
            },
            SerialPortType::BluetoothPort => Self {
                kind: PortKind::Bluetooth,
                ..Self::unknown(&info.port_name)
            },
            SerialPortType::Unknown => Self::unknown(&info.port_name),
        }
    }
}

/// The host's real serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerial;

impl SerialBackend for SystemSerial {
    fn available_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        let ports = serialport::available_ports()
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?;
        Ok(ports.into_iter().map(PortInfo::from).collect())
    }

    fn open(&self, path: &str, config: &SerialConfig) -> Result<Box<dyn SerialLine>, TransportError> {
        // Zero timeout: a read with nothing pending returns immediately.
        let port = serialport::new(path, config.baud_rate)
            .data_bits(config.data_bits())
            .stop_bits(config.stop_bits())
            .parity(config.parity())
            .flow_control(FlowControl::None)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(path.to_string()),
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(path.to_string())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        Ok(Box::new(SerialPortLine::new(port)))
    }
}

/// Line reader over an open `serialport` handle
pub struct SerialPortLine {
    port: Box<dyn SerialPort>,
    buffer: LineBuffer,
    scratch: Vec<u8>,
}

impl SerialPortLine {
    /// Wrap an already opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port,
            buffer: LineBuffer::default(),
            scratch: vec![0u8; 1024],
        }
    }
}

impl SerialLine for SerialPortLine {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        if let Some(line) = self.buffer.next_line() {
            return Ok(Some(line));
        }

        match self.port.read(&mut self.scratch) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                self.buffer.push(&self.scratch[..n]);
                Ok(self.buffer.next_line())
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(TransportError::IoError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_8n1_at_115200() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.describe(), "115200 baud (8N1)");
    }

    #[test]
    fn test_parity_from_str() {
        assert_eq!("E".parse::<SerialParity>(), Ok(SerialParity::Even));
        assert_eq!("none".parse::<SerialParity>(), Ok(SerialParity::None));
        assert!("mark".parse::<SerialParity>().is_err());
    }
}
