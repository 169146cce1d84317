use std::collections::HashMap;
use std::sync::LazyLock;

use num_enum::{FromPrimitive, IntoPrimitive};
use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use uuid::Uuid;

/// BuWizz application service advertised in the scan response.
pub const APPLICATION_SERVICE_UUID: Uuid = Uuid::from_u128(0x500592d1_74fb_4481_88b3_9919b1676e93);

/// Write + notify characteristic carrying status reports and commands.
pub const APPLICATION_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x50052901_74fb_4481_88b3_9919b1676e93);

const BOOTLOADER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x50058000_74fb_4481_88b3_9919b1676e93);
const UART_CHANNEL_1_UUID: Uuid = Uuid::from_u128(0x50053901_74fb_4481_88b3_9919b1676e93);
const UART_CHANNEL_2_UUID: Uuid = Uuid::from_u128(0x50053902_74fb_4481_88b3_9919b1676e93);
const UART_CHANNEL_3_UUID: Uuid = Uuid::from_u128(0x50053903_74fb_4481_88b3_9919b1676e93);
const UART_CHANNEL_4_UUID: Uuid = Uuid::from_u128(0x50053904_74fb_4481_88b3_9919b1676e93);

/// One-byte command identifier at the head of every application frame.
///
/// Codes outside the known catalog map to [`CommandCode::Unknown`].
///
/// ```
/// use buwizz::CommandCode;
///
/// assert_eq!(CommandCode::SetLedStatus, CommandCode::from(0x36));
/// assert_eq!(CommandCode::Unknown(0x99), CommandCode::from(0x99));
/// assert_eq!(0x20, u8::from(CommandCode::SetDeviceName));
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    FromPrimitive,
    IntoPrimitive,
    derive_more::Display,
)]
#[repr(u8)]
pub enum CommandCode {
    /// Periodic device status report (device to host).
    #[display("device_status_report")]
    DeviceStatusReport = 0x01,
    /// Set the advertised device name.
    #[display("set_device_name")]
    SetDeviceName = 0x20,
    /// Set the RGB status LEDs.
    #[display("set_led_status")]
    SetLedStatus = 0x36,
    /// A code with no catalog entry.
    #[num_enum(catch_all)]
    #[display("unknown(0x{_0:02X})")]
    Unknown(u8),
}

/// Known BuWizz GATT endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointId {
    /// BuWizz application service.
    #[strum(to_string = "application_service")]
    ApplicationService,
    /// Application characteristic used for commands and status reports.
    #[strum(to_string = "application_characteristic")]
    ApplicationCharacteristic,
    /// Bootloader characteristic.
    #[strum(to_string = "bootloader_characteristic")]
    BootloaderCharacteristic,
    /// PoweredUp UART pass-through, channel 1.
    #[strum(to_string = "uart_channel_1")]
    UartChannel1,
    /// PoweredUp UART pass-through, channel 2.
    #[strum(to_string = "uart_channel_2")]
    UartChannel2,
    /// PoweredUp UART pass-through, channel 3.
    #[strum(to_string = "uart_channel_3")]
    UartChannel3,
    /// PoweredUp UART pass-through, channel 4.
    #[strum(to_string = "uart_channel_4")]
    UartChannel4,
}

impl EndpointId {
    /// Returns whether a session cannot operate without this endpoint.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Self::ApplicationService | Self::ApplicationCharacteristic
        )
    }
}

/// Endpoint category in GATT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum EndpointKind {
    #[strum(to_string = "service")]
    Service,
    #[strum(to_string = "characteristic")]
    Characteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: Uuid,
    kind: EndpointKind,
}

impl EndpointMetadata {
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    pub(crate) fn uuid(self) -> Uuid {
        self.uuid
    }

    pub(crate) fn kind(self) -> EndpointKind {
        self.kind
    }
}

static ENDPOINTS_BY_UUID: LazyLock<HashMap<Uuid, EndpointId>> = LazyLock::new(|| {
    EndpointId::iter()
        .map(|endpoint| (metadata_for(endpoint).uuid, endpoint))
        .collect()
});

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    metadata_for(endpoint)
}

/// Resolves a UUID to a known endpoint.
pub(crate) fn endpoint_for_uuid(uuid: &Uuid) -> Option<EndpointId> {
    ENDPOINTS_BY_UUID.get(uuid).copied()
}

/// Creates a presence map initialised with all known endpoints set to `false`.
pub(crate) fn known_endpoints() -> impl Iterator<Item = EndpointId> {
    EndpointId::iter()
}

pub(crate) fn empty_presence_map() -> HashMap<EndpointId, bool> {
    EndpointId::iter().map(|endpoint| (endpoint, false)).collect()
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    let (name, uuid, kind) = match endpoint {
        EndpointId::ApplicationService => (
            "BuWizz application service",
            APPLICATION_SERVICE_UUID,
            EndpointKind::Service,
        ),
        EndpointId::ApplicationCharacteristic => (
            "BuWizz application data",
            APPLICATION_CHARACTERISTIC_UUID,
            EndpointKind::Characteristic,
        ),
        EndpointId::BootloaderCharacteristic => (
            "BuWizz bootloader",
            BOOTLOADER_CHARACTERISTIC_UUID,
            EndpointKind::Characteristic,
        ),
        EndpointId::UartChannel1 => (
            "UART channel 1",
            UART_CHANNEL_1_UUID,
            EndpointKind::Characteristic,
        ),
        EndpointId::UartChannel2 => (
            "UART channel 2",
            UART_CHANNEL_2_UUID,
            EndpointKind::Characteristic,
        ),
        EndpointId::UartChannel3 => (
            "UART channel 3",
            UART_CHANNEL_3_UUID,
            EndpointKind::Characteristic,
        ),
        EndpointId::UartChannel4 => (
            "UART channel 4",
            UART_CHANNEL_4_UUID,
            EndpointKind::Characteristic,
        ),
    };

    EndpointMetadata { name, uuid, kind }
}
