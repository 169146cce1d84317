use derive_more::From;
use thiserror::Error;

use crate::handlers::{DeviceNameError, EncodeError, LedColourError};
use crate::notification::DecodeError;
use crate::session::SessionError;

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no BuWizz device was found within {}", humantime::format_duration(*timeout))]
    DiscoveryTimedOut { timeout: std::time::Duration },
    #[error("characteristic {uuid} was not found on the connected device")]
    UnknownCharacteristic { uuid: uuid::Uuid },
    #[error("required BuWizz endpoints are missing: {missing}")]
    MissingRequiredEndpoints { missing: String },
    #[error("device `{device_id}` is not known to any adapter")]
    UnknownDevice { device_id: String },
    #[error("the session driver stopped before the request completed")]
    SessionClosed,
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain exactly five pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("invalid advertised service UUID `{value}`")]
    InvalidServiceUuid { value: String },
    #[error("hex payload is invalid")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level protocol errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum ProtocolError {
    #[error(transparent)]
    #[from(DecodeError, Box<DecodeError>)]
    Decode(Box<DecodeError>),
    #[error(transparent)]
    #[from(EncodeError, Box<EncodeError>)]
    Encode(Box<EncodeError>),
    #[error(transparent)]
    #[from(DeviceNameError, Box<DeviceNameError>)]
    DeviceName(Box<DeviceNameError>),
    #[error(transparent)]
    #[from(LedColourError, Box<LedColourError>)]
    LedColour(Box<LedColourError>),
    #[error(transparent)]
    #[from(SessionError, Box<SessionError>)]
    Session(Box<SessionError>),
    #[error(transparent)]
    #[from(InteractionError, Box<InteractionError>)]
    Interaction(Box<InteractionError>),
}
