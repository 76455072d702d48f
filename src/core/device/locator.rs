//! Device discovery by USB identity

use super::DeviceIdentity;
use crate::core::transport::{PortInfo, SerialBackend, TransportError};
use tracing::debug;

/// Resolves device identities against the live port list
pub struct DeviceLocator<'a> {
    backend: &'a dyn SerialBackend,
}

impl<'a> DeviceLocator<'a> {
    /// Locator over `backend`
    pub fn new(backend: &'a dyn SerialBackend) -> Self {
        Self { backend }
    }

    /// Path of the first attached interface reporting `identity`.
    ///
    /// Absence is `Ok(None)`: devices are hot-pluggable, so it is expected.
    /// Only a failed enumeration is an error.
    pub fn find(&self, identity: DeviceIdentity) -> Result<Option<String>, TransportError> {
        let ports = self.backend.available_ports()?;
        let found = ports
            .into_iter()
            .find(|port| port.matches(identity.vendor_id, identity.product_id))
            .map(|port| port.name);

        if found.is_none() {
            debug!(identity = %identity, "no interface with matching identity");
        }
        Ok(found)
    }

    /// Full interface list
    pub fn list(&self) -> Result<Vec<PortInfo>, TransportError> {
        self.backend.available_ports()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockSerialBackend;

    #[test]
    fn test_finds_first_match() {
        let mut backend = MockSerialBackend::new();
        backend.expect_available_ports().returning(|| {
            Ok(vec![
                PortInfo::unknown("/dev/ttyS0"),
                PortInfo::usb("/dev/ttyUSB0", 1027, 24577),
                PortInfo::usb("/dev/ttyUSB1", 1659, 8963),
                PortInfo::usb("/dev/ttyUSB2", 1659, 8963),
            ])
        });

        let locator = DeviceLocator::new(&backend);
        assert_eq!(
            locator.find(DeviceIdentity::new(1659, 8963)).unwrap().as_deref(),
            Some("/dev/ttyUSB1")
        );
    }

    #[test]
    fn test_absent_device_is_not_an_error() {
        let mut backend = MockSerialBackend::new();
        backend
            .expect_available_ports()
            .returning(|| Ok(vec![PortInfo::usb("/dev/ttyUSB0", 1027, 24577)]));

        let locator = DeviceLocator::new(&backend);
        assert_eq!(locator.find(DeviceIdentity::new(1659, 8963)).unwrap(), None);
    }

    #[test]
    fn test_enumeration_failure_is_an_error() {
        let mut backend = MockSerialBackend::new();
        backend
            .expect_available_ports()
            .returning(|| Err(TransportError::EnumerationFailed("udev".into())));

        let locator = DeviceLocator::new(&backend);
        assert!(locator.find(DeviceIdentity::new(1659, 8963)).is_err());
    }
}
