use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use btleplug::api::bleuuid::uuid_from_u16;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::hardware::{ConnectedPeripheral, HardwareClient, NotificationStream, WriteMode};
use super::model::{
    CharacteristicInfo, DescriptorInfo, FoundDevice, InspectReport, ReadValue, ServiceInfo,
};
use super::session::{endpoint_presence, negotiate_session_endpoints};
use crate::error::{FixtureError, InteractionError};
use crate::layout::LayoutCatalog;
use crate::matcher::DeviceMatcher;
use crate::notification::RawPayload;

/// Status report emitted when no notification fixture is configured: USB
/// powered, full battery, 13.0 V, 25 °C, level and upright.
const DEFAULT_STATUS_REPORT: [u8; 54] = {
    let mut report = [0u8; 54];
    report[0] = 0x01;
    report[1] = 0x58;
    report[2] = 0x50;
    report[4] = 0x0A;
    report[9] = 0x19;
    report[14] = 0xF0;
    report[15] = 0x7F;
    report
};

const DEVICE_INFORMATION_SERVICE: u16 = 0x180A;
const FIRMWARE_REVISION: u16 = 0x2A26;
const CLIENT_CHARACTERISTIC_CONFIGURATION: u16 = 0x2902;
const FAKE_FIRMWARE_REVISION: &[u8] = b"3.21";

/// Parsed fake scan fixture records.
///
/// Records are `;`-separated, each `adapter|device_id|local_name|rssi|services`
/// where `services` is a `+`-separated UUID list. `-` marks an absent local
/// name, RSSI or service list.
#[derive(Debug, Clone, derive_more::Into)]
pub struct ScanFixture {
    devices: Vec<FoundDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }
        let devices = value
            .split(';')
            .map(parse_scan_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { devices })
    }
}

/// Parsed fake notification payloads, comma-separated hexadecimal.
#[derive(Debug, Clone, derive_more::Into)]
pub struct NotificationPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Ok(Self {
                payloads: Vec::new(),
            });
        }
        let payloads = value
            .split(',')
            .map(parse_hex)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { payloads })
    }
}

/// Settings for constructing a fake hardware backend.
#[derive(Debug, Builder)]
pub struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    notifications: Option<NotificationPayloads>,
    #[builder(default)]
    discovery_delay: Duration,
    /// Ends the notification stream after the fixture payloads, as a
    /// peripheral that drops the link would.
    #[builder(default)]
    disconnect_after_notifications: bool,
}

/// Frames written to fake peripherals, in write order.
#[derive(Debug, Clone, Default)]
pub struct WriteLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl WriteLog {
    #[must_use]
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, frame: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.to_vec());
    }
}

/// Fixture-driven hardware client used in tests and non-hardware environments.
///
/// Discovery never resolves when no fixture device matches, like a real scan.
/// Notification streams stay open after the fixture payloads are delivered
/// unless the config asks for a disconnect.
#[derive(Debug)]
pub struct FakeHardwareClient {
    devices: Vec<FoundDevice>,
    notifications: Vec<Vec<u8>>,
    discovery_delay: Duration,
    disconnect_after_notifications: bool,
    catalog: Arc<LayoutCatalog>,
    writes: WriteLog,
}

impl FakeHardwareClient {
    #[must_use]
    pub fn new(config: FakeBackendConfig, catalog: Arc<LayoutCatalog>) -> Self {
        let notifications = config
            .notifications
            .map_or_else(|| vec![DEFAULT_STATUS_REPORT.to_vec()], Into::into);

        Self {
            devices: config.scan_fixture.into(),
            notifications,
            discovery_delay: config.discovery_delay,
            disconnect_after_notifications: config.disconnect_after_notifications,
            catalog,
            writes: WriteLog::default(),
        }
    }

    /// Returns the shared log of frames written by connected peripherals.
    #[must_use]
    pub fn writes(&self) -> WriteLog {
        self.writes.clone()
    }
}

#[async_trait]
impl HardwareClient for FakeHardwareClient {
    #[instrument(skip(self), level = "debug", fields(service = %matcher.service_uuid()))]
    async fn discover(&self, matcher: &DeviceMatcher) -> Result<FoundDevice, InteractionError> {
        if !self.discovery_delay.is_zero() {
            sleep(self.discovery_delay).await;
        }

        match self
            .devices
            .iter()
            .find(|device| matcher.matches(device.advertised_services()))
        {
            Some(device) => Ok(device.clone()),
            None => {
                debug!("no fixture device matches; scanning indefinitely");
                std::future::pending().await
            }
        }
    }

    async fn connect(
        &self,
        device: &FoundDevice,
    ) -> Result<Box<dyn ConnectedPeripheral>, InteractionError> {
        if !self
            .devices
            .iter()
            .any(|candidate| candidate.device_id() == device.device_id())
        {
            return Err(InteractionError::UnknownDevice {
                device_id: device.device_id().to_string(),
            });
        }

        let services = default_services(&self.catalog);
        negotiate_session_endpoints(&services, &self.catalog)?;
        Ok(Box::new(FakePeripheral {
            device: device.clone(),
            services,
            telemetry_characteristic: self.catalog.telemetry_characteristic(),
            notifications: self.notifications.clone(),
            disconnect_after_notifications: self.disconnect_after_notifications,
            writes: self.writes.clone(),
        }))
    }
}

#[derive(Debug)]
struct FakePeripheral {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    telemetry_characteristic: Uuid,
    notifications: Vec<Vec<u8>>,
    disconnect_after_notifications: bool,
    writes: WriteLog,
}

impl FakePeripheral {
    fn ensure_characteristic(&self, uuid: Uuid) -> Result<(), InteractionError> {
        if self
            .services
            .iter()
            .any(|service| service.characteristic(uuid).is_some())
        {
            Ok(())
        } else {
            Err(InteractionError::UnknownCharacteristic { uuid })
        }
    }
}

#[async_trait]
impl ConnectedPeripheral for FakePeripheral {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn inspect_report(&self) -> InspectReport {
        InspectReport::new(
            self.device.clone(),
            self.services.clone(),
            endpoint_presence(&self.services),
        )
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), InteractionError> {
        self.ensure_characteristic(characteristic)
    }

    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        _mode: WriteMode,
    ) -> Result<(), InteractionError> {
        self.ensure_characteristic(characteristic)?;
        self.writes.record(payload);
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, InteractionError> {
        let characteristic = self.telemetry_characteristic;
        let payloads = tokio_stream::iter(self.notifications.clone())
            .map(move |bytes| RawPayload::received_now(characteristic, bytes));
        if self.disconnect_after_notifications {
            debug!("fake peripheral disconnects after its fixture payloads");
            return Ok(Box::pin(payloads));
        }
        Ok(Box::pin(payloads.chain(tokio_stream::pending())))
    }

    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        Ok(())
    }
}

fn parse_scan_record(raw_record: &str) -> Result<FoundDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [adapter, device_id, local_name, rssi, services] = fields[..] else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if fields.iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = (local_name != "-").then(|| local_name.to_string());
    let rssi = if rssi == "-" {
        None
    } else {
        Some(rssi.parse::<i16>()?)
    };
    let services = if services == "-" {
        Vec::new()
    } else {
        services
            .split('+')
            .map(|value| {
                Uuid::parse_str(value.trim()).map_err(|_| FixtureError::InvalidServiceUuid {
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(FoundDevice::new(adapter, device_id, local_name, rssi).with_advertised_services(services))
}

fn parse_hex(raw_value: &str) -> Result<Vec<u8>, FixtureError> {
    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(cleaned)?)
}

/// The application service first, then a device information service with a
/// readable firmware revision.
fn default_services(catalog: &LayoutCatalog) -> Vec<ServiceInfo> {
    let notifications_off = DescriptorInfo::new(
        uuid_from_u16(CLIENT_CHARACTERISTIC_CONFIGURATION),
        ReadValue::Read {
            bytes: vec![0x00, 0x00],
        },
    );
    let telemetry = CharacteristicInfo::new(
        catalog.telemetry_characteristic(),
        vec!["write".to_string(), "notify".to_string()],
    )
    .with_descriptors(vec![notifications_off]);
    let firmware = CharacteristicInfo::new(uuid_from_u16(FIRMWARE_REVISION), vec!["read".to_string()])
        .with_value(ReadValue::Read {
            bytes: FAKE_FIRMWARE_REVISION.to_vec(),
        });

    vec![
        ServiceInfo::new(catalog.service_uuid(), true, vec![telemetry]),
        ServiceInfo::new(uuid_from_u16(DEVICE_INFORMATION_SERVICE), true, vec![firmware]),
    ]
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::protocol::APPLICATION_SERVICE_UUID;

    const BUWIZZ_RECORD: &str = "hci0|AA:BB|BuWizz3|-43|500592d1-74fb-4481-88b3-9919b1676e93";

    #[rstest]
    #[case(BUWIZZ_RECORD, 1)]
    #[case("hci0|AA:BB|BuWizz3|-43|-;hci1|CC:DD|-|-|-", 2)]
    fn scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let devices: Vec<FoundDevice> = fixture
            .parse::<ScanFixture>()
            .expect("fixture should parse")
            .into();
        assert_eq!(expected_count, devices.len());
    }

    #[test]
    fn scan_fixture_reads_advertised_services() {
        let devices: Vec<FoundDevice> = BUWIZZ_RECORD
            .parse::<ScanFixture>()
            .expect("fixture should parse")
            .into();
        assert_eq!(&[APPLICATION_SERVICE_UUID], devices[0].advertised_services());
        assert_eq!(Some(-43), devices[0].rssi());
    }

    #[rstest]
    #[case("hci0|AA:BB|BuWizz3|-43", "field count")]
    #[case("hci0||BuWizz3|-43|-", "empty field")]
    #[case("hci0|AA:BB|BuWizz3|loud|-", "rssi")]
    #[case("hci0|AA:BB|BuWizz3|-43|not-a-uuid", "uuid")]
    fn scan_fixture_rejects_malformed_records(#[case] fixture: &str, #[case] label: &str) {
        let result = fixture.parse::<ScanFixture>();
        match label {
            "field count" => assert_matches!(result, Err(FixtureError::InvalidRecordFieldCount)),
            "empty field" => assert_matches!(result, Err(FixtureError::EmptyRecordField)),
            "rssi" => assert_matches!(result, Err(FixtureError::InvalidRssi(_))),
            _ => assert_matches!(result, Err(FixtureError::InvalidServiceUuid { .. })),
        }
    }

    #[test]
    fn notification_payloads_parse_comma_separated_hex() {
        let payloads: Vec<Vec<u8>> = "01 02, ff"
            .parse::<NotificationPayloads>()
            .expect("payloads should parse")
            .into();
        assert_eq!(vec![vec![0x01, 0x02], vec![0xFF]], payloads);
    }

    #[test]
    fn notification_payloads_reject_odd_length() {
        assert_matches!(
            "ABC".parse::<NotificationPayloads>(),
            Err(FixtureError::InvalidHex(_))
        );
    }

    fn connected_peripheral_config(disconnect: bool) -> FakeBackendConfig {
        FakeBackendConfig::builder()
            .scan_fixture(BUWIZZ_RECORD.parse().expect("fixture should parse"))
            .notifications("01 02,03".parse().expect("payloads should parse"))
            .disconnect_after_notifications(disconnect)
            .build()
    }

    #[tokio::test]
    async fn inspect_report_carries_read_values_and_descriptors() -> anyhow::Result<()> {
        let catalog = Arc::new(LayoutCatalog::default());
        let client =
            FakeHardwareClient::new(connected_peripheral_config(false), Arc::clone(&catalog));
        let device = client.discover(&DeviceMatcher::for_catalog(&catalog)).await?;
        let peripheral = client.connect(&device).await?;

        let report = peripheral.inspect_report();
        let [application, device_information] = report.services() else {
            panic!("expected two services, got {:?}", report.services());
        };

        let telemetry = &application.characteristics()[0];
        assert_eq!(None, telemetry.value());
        assert_eq!(
            vec![DescriptorInfo::new(
                uuid_from_u16(CLIENT_CHARACTERISTIC_CONFIGURATION),
                ReadValue::Read { bytes: vec![0, 0] },
            )],
            telemetry.descriptors()
        );

        let firmware = &device_information.characteristics()[0];
        assert_eq!(uuid_from_u16(FIRMWARE_REVISION), firmware.uuid());
        assert_eq!(Some(&b"3.21"[..]), firmware.value().and_then(ReadValue::bytes));
        Ok(())
    }

    #[rstest]
    #[case::stays_open(false, None)]
    #[case::disconnects(true, Some(None))]
    #[tokio::test(start_paused = true)]
    async fn notification_stream_end_follows_disconnect_option(
        #[case] disconnect: bool,
        #[case] after_fixtures: Option<Option<Vec<u8>>>,
    ) -> anyhow::Result<()> {
        let catalog = Arc::new(LayoutCatalog::default());
        let client =
            FakeHardwareClient::new(connected_peripheral_config(disconnect), Arc::clone(&catalog));
        let device = client.discover(&DeviceMatcher::for_catalog(&catalog)).await?;
        let peripheral = client.connect(&device).await?;
        let mut stream = peripheral.notifications().await?;

        let mut delivered = Vec::new();
        for _ in 0..2 {
            if let Some(payload) = stream.next().await {
                delivered.push(payload.bytes().to_vec());
            }
        }
        assert_eq!(vec![vec![0x01, 0x02], vec![0x03]], delivered);

        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .ok()
            .map(|payload| payload.map(|payload| payload.bytes().to_vec()));
        assert_eq!(after_fixtures, next);
        Ok(())
    }

    #[test]
    fn default_status_report_decodes() {
        let report = crate::notification::decode(&DEFAULT_STATUS_REPORT)
            .expect("default fake report should decode");
        assert!(report.flags.usb_connected);
        assert!((report.battery_voltage - 13.0).abs() < 1e-4);
        assert_eq!(25, report.controller_temperature);
    }
}
