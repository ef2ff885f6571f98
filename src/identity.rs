//! Device identity resolution from a hardware root-of-trust
//!
//! The broker client id, topic namespace, and display banner all derive
//! from one value: the serial number of the device's secure element,
//! rendered as uppercase hex (two characters per byte). Resolution failure
//! is fatal by contract; a device without a provisioned identity cannot
//! derive topics and has nothing to do.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

/// Serial length reported by the factory-provisioned secure element.
pub const FACTORY_SERIAL_LEN: usize = 9;

/// Errors raised while resolving the device identity
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Hardware security module failure: {message}")]
    HardwareFailure { message: String },

    #[error("Serial blob '{path}' unreadable: {source}")]
    Provisioning {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serial number has invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Serial number is empty")]
    EmptySerial,
}

impl IdentityError {
    /// Create a hardware module failure
    pub fn hardware_failure<S: Into<String>>(message: S) -> Self {
        Self::HardwareFailure {
            message: message.into(),
        }
    }
}

/// Access to the secure element's serial number.
///
/// Implementations wrap whatever bus or blob the platform provides. The
/// serial must be stable across calls on the same physical device.
pub trait SecureElement: Send + Sync {
    /// Read the raw serial bytes from the element.
    fn read_serial(&self) -> Result<Vec<u8>, IdentityError>;
}

/// Stable, hardware-derived device identifier.
///
/// Immutable once resolved; rendered as uppercase hex with exactly two
/// characters per serial byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Render a serial as a hex identity. Rejects empty serials.
    pub fn from_serial(serial: &[u8]) -> Result<Self, IdentityError> {
        if serial.is_empty() {
            return Err(IdentityError::EmptySerial);
        }
        let hex: String = serial.iter().map(|byte| format!("{byte:02X}")).collect();
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves the device identity from a secure element.
pub struct IdentityProvider<E> {
    element: E,
}

impl<E: SecureElement> IdentityProvider<E> {
    pub fn new(element: E) -> Self {
        Self { element }
    }

    /// Read the serial and render the identity.
    ///
    /// Any element error propagates unchanged; callers treat it as fatal.
    pub fn resolve(&self) -> Result<DeviceIdentity, IdentityError> {
        let serial = self.element.read_serial()?;
        let identity = DeviceIdentity::from_serial(&serial)?;
        debug!(identity = %identity, serial_len = serial.len(), "Resolved device identity");
        Ok(identity)
    }
}

/// Secure element backed by a factory-provisioned serial blob on disk.
///
/// Stands in for a real secure-element bus on platforms where provisioning
/// wrote the serial to a file. Enforces the 9-byte length the hardware
/// part reports.
pub struct FactorySerial {
    path: PathBuf,
}

impl FactorySerial {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl SecureElement for FactorySerial {
    fn read_serial(&self) -> Result<Vec<u8>, IdentityError> {
        let serial = std::fs::read(&self.path).map_err(|source| IdentityError::Provisioning {
            path: self.path.clone(),
            source,
        })?;

        if serial.len() != FACTORY_SERIAL_LEN {
            return Err(IdentityError::InvalidLength {
                expected: FACTORY_SERIAL_LEN,
                actual: serial.len(),
            });
        }

        Ok(serial)
    }
}

/// Convenience for boundary implementations that already hold the bytes.
impl SecureElement for Vec<u8> {
    fn read_serial(&self) -> Result<Vec<u8>, IdentityError> {
        if self.is_empty() {
            return Err(IdentityError::EmptySerial);
        }
        Ok(self.clone())
    }
}
