use std::collections::HashMap;

use serde::Serialize;
use serde_with::{hex::Hex, serde_as};
use uuid::Uuid;

use crate::protocol::EndpointId;

use super::scan_model::ScanIdentity;

/// A discovered BLE peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FoundDevice {
    adapter_name: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
    advertised_services: Vec<Uuid>,
    scan_identity: Option<ScanIdentity>,
}

impl FoundDevice {
    /// Creates a new discovered-device record.
    #[must_use]
    pub fn new(
        adapter_name: impl Into<String>,
        device_id: impl Into<String>,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            device_id: device_id.into(),
            local_name,
            rssi,
            advertised_services: Vec::new(),
            scan_identity: None,
        }
    }

    /// Attaches the service UUIDs seen in the advertisement.
    #[must_use]
    pub fn with_advertised_services(mut self, services: Vec<Uuid>) -> Self {
        self.advertised_services = services;
        self
    }

    #[must_use]
    pub(crate) fn with_scan_identity(mut self, scan_identity: Option<ScanIdentity>) -> Self {
        self.scan_identity = scan_identity;
        self
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    #[must_use]
    pub fn advertised_services(&self) -> &[Uuid] {
        &self.advertised_services
    }

    /// Returns the identity parsed from manufacturer data, if any.
    #[must_use]
    pub fn scan_identity(&self) -> Option<&ScanIdentity> {
        self.scan_identity.as_ref()
    }
}

/// Outcome of reading a characteristic or descriptor value during inspection.
///
/// A failed read is kept next to the attribute instead of aborting the
/// inspection; some attributes refuse reads until the device is paired.
#[serde_as]
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReadValue {
    Read {
        #[serde_as(as = "Hex")]
        bytes: Vec<u8>,
    },
    Failed {
        error: String,
    },
}

impl ReadValue {
    pub(crate) fn from_result<E: std::fmt::Display>(result: Result<Vec<u8>, E>) -> Self {
        match result {
            Ok(bytes) => Self::Read { bytes },
            Err(error) => Self::Failed {
                error: error.to_string(),
            },
        }
    }

    /// Returns the bytes read, or `None` when the read failed.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Read { bytes } => Some(bytes),
            Self::Failed { .. } => None,
        }
    }
}

/// A descriptor attached to a characteristic, with its read outcome.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DescriptorInfo {
    uuid: Uuid,
    value: ReadValue,
}

impl DescriptorInfo {
    pub(crate) fn new(uuid: Uuid, value: ReadValue) -> Self {
        Self { uuid, value }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn value(&self) -> &ReadValue {
        &self.value
    }
}

/// A characteristic description discovered on a connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CharacteristicInfo {
    uuid: Uuid,
    properties: Vec<String>,
    value: Option<ReadValue>,
    descriptors: Vec<DescriptorInfo>,
}

impl CharacteristicInfo {
    pub(crate) fn new(uuid: Uuid, properties: Vec<String>) -> Self {
        Self {
            uuid,
            properties,
            value: None,
            descriptors: Vec::new(),
        }
    }

    #[must_use]
    pub(crate) fn with_value(mut self, value: ReadValue) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub(crate) fn with_descriptors(mut self, descriptors: Vec<DescriptorInfo>) -> Self {
        self.descriptors = descriptors;
        self
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns lower-case property labels such as `write` or `notify`.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Returns the value read during inspection; `None` when the
    /// characteristic is not readable.
    #[must_use]
    pub fn value(&self) -> Option<&ReadValue> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn descriptors(&self) -> &[DescriptorInfo] {
        &self.descriptors
    }

    pub(crate) fn has_property(&self, property: &str) -> bool {
        self.properties
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(property))
    }
}

/// A GATT service with discovered characteristics.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ServiceInfo {
    uuid: Uuid,
    primary: bool,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub(crate) fn new(uuid: Uuid, primary: bool, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid,
            primary,
            characteristics,
        }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }

    pub(crate) fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicInfo> {
        self.characteristics
            .iter()
            .find(|characteristic| characteristic.uuid == uuid)
    }
}

/// Presence flags for the catalogued BuWizz endpoints.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct EndpointPresence {
    by_endpoint: HashMap<EndpointId, bool>,
}

impl EndpointPresence {
    pub(crate) fn new(by_endpoint: HashMap<EndpointId, bool>) -> Self {
        Self { by_endpoint }
    }

    /// Returns whether an endpoint is present on the connected device.
    #[must_use]
    pub fn is_present(&self, endpoint: EndpointId) -> bool {
        self.by_endpoint.get(&endpoint).copied().unwrap_or(false)
    }
}

/// Result of inspecting a connected BuWizz.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct InspectReport {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    endpoint_presence: EndpointPresence,
}

impl InspectReport {
    pub(crate) fn new(
        device: FoundDevice,
        services: Vec<ServiceInfo>,
        endpoint_presence: EndpointPresence,
    ) -> Self {
        Self {
            device,
            services,
            endpoint_presence,
        }
    }

    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        &self.device
    }

    #[must_use]
    pub fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    #[must_use]
    pub fn endpoint_presence(&self) -> &EndpointPresence {
        &self.endpoint_presence
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn read_values_serialize_as_tagged_hex() -> anyhow::Result<()> {
        let characteristic = CharacteristicInfo::new(Uuid::from_u128(0x2a26), vec!["read".into()])
            .with_value(ReadValue::Read {
                bytes: vec![0x01, 0xAB],
            })
            .with_descriptors(vec![DescriptorInfo::new(
                Uuid::from_u128(0x2902),
                ReadValue::Failed {
                    error: "not permitted".into(),
                },
            )]);

        let json = serde_json::to_value(&characteristic)?;

        assert_eq!(json!({"outcome": "read", "bytes": "01ab"}), json["value"]);
        assert_eq!(
            json!({"outcome": "failed", "error": "not permitted"}),
            json["descriptors"][0]["value"]
        );
        Ok(())
    }

    #[test]
    fn unreadable_characteristic_serializes_null_value() -> anyhow::Result<()> {
        let characteristic = CharacteristicInfo::new(Uuid::from_u128(0x2a26), vec!["write".into()]);

        let json = serde_json::to_value(&characteristic)?;

        assert!(json["value"].is_null());
        assert_eq!(json!([]), json["descriptors"]);
        Ok(())
    }

    #[test]
    fn read_value_keeps_error_text() {
        let value = ReadValue::from_result::<&str>(Err("gatt error 0x02"));

        assert_eq!(None, value.bytes());
        assert_eq!(
            ReadValue::Failed {
                error: "gatt error 0x02".into()
            },
            value
        );
    }
}
