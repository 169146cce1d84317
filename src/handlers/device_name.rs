use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::ProtocolError;
use crate::session::SessionHandle;

use super::OutboundCommand;

const MAX_DEVICE_NAME_LEN: usize = 12;

/// Errors returned by device-name validation.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DeviceNameError {
    #[error("device name cannot be empty")]
    Empty,
    #[error("device name is {len} bytes; at most {max} are allowed")]
    TooLong { len: usize, max: usize },
    #[error("device name byte 0x{byte:02X} at index {index} is not printable ASCII")]
    NonPrintable { index: usize, byte: u8 },
}

/// Advertised device name: 1 to 12 printable ASCII characters.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct DeviceName(String);

impl DeviceName {
    /// Creates a validated device name.
    ///
    /// ```
    /// use buwizz::DeviceName;
    ///
    /// let name = DeviceName::new("Crane")?;
    /// assert_eq!("Crane", name.as_str());
    /// assert!(DeviceName::new("a name that is far too long").is_err());
    /// # Ok::<(), buwizz::DeviceNameError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the name is empty, longer than 12 bytes, or
    /// contains anything other than printable ASCII.
    pub fn new(name: impl Into<String>) -> Result<Self, DeviceNameError> {
        let name = name.into();
        Self::validate(name.as_bytes())?;
        Ok(Self(name))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, DeviceNameError> {
        Self::validate(bytes)?;
        Ok(Self(bytes.iter().map(|byte| char::from(*byte)).collect()))
    }

    fn validate(bytes: &[u8]) -> Result<(), DeviceNameError> {
        if bytes.is_empty() {
            return Err(DeviceNameError::Empty);
        }
        if bytes.len() > MAX_DEVICE_NAME_LEN {
            return Err(DeviceNameError::TooLong {
                len: bytes.len(),
                max: MAX_DEVICE_NAME_LEN,
            });
        }
        if let Some((index, byte)) = bytes
            .iter()
            .enumerate()
            .find(|(_, byte)| !(0x20..=0x7E).contains(*byte))
        {
            return Err(DeviceNameError::NonPrintable { index, byte: *byte });
        }
        Ok(())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceName {
    type Err = DeviceNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

/// Handler for the set-device-name command.
pub struct DeviceNameHandler;

impl DeviceNameHandler {
    /// Renames the connected device.
    ///
    /// ```
    /// # async fn demo(session: &buwizz::SessionHandle) -> Result<(), buwizz::ProtocolError> {
    /// use buwizz::{DeviceName, DeviceNameHandler};
    ///
    /// DeviceNameHandler::set_name(session, DeviceName::new("Crane")?).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the session is not subscribed or encoding fails.
    pub async fn set_name(session: &SessionHandle, name: DeviceName) -> Result<(), ProtocolError> {
        session.send(OutboundCommand::SetDeviceName(name)).await?;
        Ok(())
    }
}
