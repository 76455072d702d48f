//! Device link lifecycle: locate, connect, read
//!
//! Any failure after the device was located drops the link all the way back
//! to unresolved. The next poll re-enumerates instead of retrying a path that
//! may now belong to nothing (or to another device).

use super::{DeviceIdentity, DeviceLocator, DeviceRole};
use crate::core::transport::{SerialBackend, SerialConfig, SerialLine, TransportError};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

enum LinkState {
    Unresolved,
    Located {
        path: String,
    },
    Connected {
        path: String,
        line: Box<dyn SerialLine>,
    },
}

/// Snapshot of a link for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    /// Device role
    pub role: DeviceRole,
    /// USB identity searched for
    pub identity: DeviceIdentity,
    /// Resolved interface path
    pub path: Option<String>,
    /// Interface has been located
    pub available: bool,
    /// Connection is open
    pub connected: bool,
    /// Number of times the link fell back to unresolved
    pub resets: u64,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.connected {
            "connected"
        } else if self.available {
            "located"
        } else {
            "absent"
        };
        write!(f, "{} [{}] {}", self.role, self.identity, state)?;
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        Ok(())
    }
}

/// One serial device and its connection state
pub struct DeviceLink {
    role: DeviceRole,
    identity: DeviceIdentity,
    state: LinkState,
    resets: u64,
}

impl DeviceLink {
    /// Unresolved link for the device with `identity`
    pub fn new(role: DeviceRole, identity: DeviceIdentity) -> Self {
        Self {
            role,
            identity,
            state: LinkState::Unresolved,
            resets: 0,
        }
    }

    /// Device role
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Interface path, once located
    pub fn path(&self) -> Option<&str> {
        match &self.state {
            LinkState::Unresolved => None,
            LinkState::Located { path } | LinkState::Connected { path, .. } => Some(path),
        }
    }

    /// Interface has been located
    pub fn is_available(&self) -> bool {
        !matches!(self.state, LinkState::Unresolved)
    }

    /// Connection is open
    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected { .. })
    }

    /// Status snapshot
    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            role: self.role,
            identity: self.identity,
            path: self.path().map(str::to_string),
            available: self.is_available(),
            connected: self.is_connected(),
            resets: self.resets,
        }
    }

    /// Look the device up unless it is already located.
    ///
    /// Returns whether the link is available afterwards. A missing device is
    /// not an error; the next poll simply tries again.
    pub fn ensure_located(&mut self, locator: &DeviceLocator<'_>) -> Result<bool, TransportError> {
        if self.is_available() {
            return Ok(true);
        }

        match locator.find(self.identity)? {
            Some(path) => {
                info!(device = %self.role, identity = %self.identity, port = %path, "device located");
                self.state = LinkState::Located { path };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Open the located interface unless already connected.
    ///
    /// A failed open resets the link fully so the interface is rediscovered.
    pub fn ensure_connected(&mut self, backend: &dyn SerialBackend, config: &SerialConfig) -> bool {
        let path = match &self.state {
            LinkState::Unresolved => return false,
            LinkState::Connected { .. } => return true,
            LinkState::Located { path } => path.clone(),
        };

        match backend.open(&path, config) {
            Ok(line) => {
                info!(device = %self.role, port = %path, params = %config.describe(), "device connected");
                self.state = LinkState::Connected { path, line };
                true
            }
            Err(e) => {
                warn!(device = %self.role, port = %path, error = %e, "could not open device, resetting link");
                self.reset();
                false
            }
        }
    }

    /// Read one complete line if connected and available.
    ///
    /// An I/O failure resets the link and yields `None` for this poll.
    pub fn read_line(&mut self) -> Option<String> {
        let result = match &mut self.state {
            LinkState::Connected { line, .. } => line.read_line(),
            _ => return None,
        };

        match result {
            Ok(line) => line,
            Err(e) => {
                warn!(device = %self.role, port = ?self.path(), error = %e, "read failed, resetting link");
                self.reset();
                None
            }
        }
    }

    /// Drop the connection and forget the path
    pub fn reset(&mut self) {
        if self.is_available() {
            self.resets += 1;
        }
        self.state = LinkState::Unresolved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MockSerialBackend, MockSerialLine, PortInfo};
    use mockall::Sequence;

    const PLC: DeviceIdentity = DeviceIdentity::new(1659, 8963);

    fn plc_link() -> DeviceLink {
        DeviceLink::new(DeviceRole::Controllino, PLC)
    }

    #[test]
    fn test_absent_device_stays_unresolved() {
        let mut backend = MockSerialBackend::new();
        backend.expect_available_ports().times(2).returning(|| Ok(vec![]));
        backend.expect_open().never();

        let mut link = plc_link();
        let locator = DeviceLocator::new(&backend);
        for _ in 0..2 {
            assert!(!link.ensure_located(&locator).unwrap());
            assert!(!link.ensure_connected(&backend, &SerialConfig::default()));
            assert_eq!(link.read_line(), None);
        }
        assert!(!link.is_available());
        assert_eq!(link.status().resets, 0);
    }

    #[test]
    fn test_located_link_does_not_enumerate_again() {
        let mut backend = MockSerialBackend::new();
        backend
            .expect_available_ports()
            .times(1)
            .returning(|| Ok(vec![PortInfo::usb("/dev/ttyUSB0", 1659, 8963)]));

        let mut link = plc_link();
        let locator = DeviceLocator::new(&backend);
        assert!(link.ensure_located(&locator).unwrap());
        assert!(link.ensure_located(&locator).unwrap());
        assert_eq!(link.path(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_open_failure_resets_fully() {
        let mut backend = MockSerialBackend::new();
        backend
            .expect_available_ports()
            .times(2)
            .returning(|| Ok(vec![PortInfo::usb("/dev/ttyUSB0", 1659, 8963)]));
        backend
            .expect_open()
            .times(1)
            .returning(|path, _| Err(TransportError::PermissionDenied(path.to_string())));

        let mut link = plc_link();
        let locator = DeviceLocator::new(&backend);
        assert!(link.ensure_located(&locator).unwrap());
        assert!(!link.ensure_connected(&backend, &SerialConfig::default()));
        assert!(!link.is_available());
        assert_eq!(link.path(), None);

        // Next poll rediscovers
        assert!(link.ensure_located(&locator).unwrap());
    }

    #[test]
    fn test_reads_lines_when_connected() {
        let mut line = MockSerialLine::new();
        let mut seq = Sequence::new();
        line.expect_read_line()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some("LOG;START_TENSION;".to_string())));
        line.expect_read_line()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(None));

        let mut backend = MockSerialBackend::new();
        backend
            .expect_available_ports()
            .returning(|| Ok(vec![PortInfo::usb("/dev/ttyUSB0", 1659, 8963)]));
        backend
            .expect_open()
            .times(1)
            .return_once(move |_, _| Ok(Box::new(line) as Box<dyn SerialLine>));

        let mut link = plc_link();
        let locator = DeviceLocator::new(&backend);
        link.ensure_located(&locator).unwrap();
        assert!(link.ensure_connected(&backend, &SerialConfig::default()));
        assert!(link.ensure_connected(&backend, &SerialConfig::default()));

        assert_eq!(link.read_line().as_deref(), Some("LOG;START_TENSION;"));
        assert_eq!(link.read_line(), None);
        assert!(link.is_connected());
    }

    #[test]
    fn test_read_fault_forces_rediscovery() {
        let mut line = MockSerialLine::new();
        line.expect_read_line().times(1).returning(|| {
            Err(TransportError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device unplugged",
            )))
        });

        let mut backend = MockSerialBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_available_ports()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![PortInfo::usb("/dev/ttyUSB0", 1659, 8963)]));
        backend
            .expect_open()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move |_, _| Ok(Box::new(line) as Box<dyn SerialLine>));
        // USB re-enumeration moved the device
        backend
            .expect_available_ports()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![PortInfo::usb("/dev/ttyUSB3", 1659, 8963)]));

        let mut link = plc_link();
        let locator = DeviceLocator::new(&backend);
        link.ensure_located(&locator).unwrap();
        link.ensure_connected(&backend, &SerialConfig::default());

        assert_eq!(link.read_line(), None);
        assert!(!link.is_available());
        assert!(!link.is_connected());
        assert_eq!(link.status().resets, 1);

        assert!(link.ensure_located(&locator).unwrap());
        assert_eq!(link.path(), Some("/dev/ttyUSB3"));
    }
}
