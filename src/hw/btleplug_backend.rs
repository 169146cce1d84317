use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::runtime::Handle;
use tokio::time::sleep;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use super::hardware::{ConnectedPeripheral, HardwareClient, NotificationStream, WriteMode};
use super::model::{
    CharacteristicInfo, DescriptorInfo, EndpointPresence, FoundDevice, InspectReport, ReadValue,
    ServiceInfo,
};
use super::scan_model::{BUWIZZ_COMPANY_ID, ScanIdentity, ScanModelHandler};
use super::session::{endpoint_presence, negotiate_session_endpoints};
use crate::error::InteractionError;
use crate::layout::LayoutCatalog;
use crate::matcher::DeviceMatcher;
use crate::notification::RawPayload;

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Hardware backend backed by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    manager: Manager,
    catalog: Arc<LayoutCatalog>,
}

impl BtleplugBackend {
    /// Creates the real BLE backend.
    pub(crate) async fn new(catalog: Arc<LayoutCatalog>) -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self { manager, catalog })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }

    async fn find_peripheral(
        &self,
        device_id: &str,
    ) -> Result<(Adapter, Peripheral), InteractionError> {
        for handle in self.adapters().await? {
            for peripheral in handle.adapter.peripherals().await? {
                if peripheral.id().to_string() == device_id {
                    return Ok((handle.adapter, peripheral));
                }
            }
        }
        Err(InteractionError::UnknownDevice {
            device_id: device_id.to_string(),
        })
    }
}

#[async_trait]
impl HardwareClient for BtleplugBackend {
    #[instrument(skip(self), level = "debug", fields(service = %matcher.service_uuid()))]
    async fn discover(&self, matcher: &DeviceMatcher) -> Result<FoundDevice, InteractionError> {
        let adapters = self.adapters().await?;
        info!(adapter_count = adapters.len(), "starting BLE scan");

        let filter = ScanFilter {
            services: vec![matcher.service_uuid()],
        };
        // Stops every started scan however this future exits.
        let mut scans = ScanGuard::default();
        for handle in &adapters {
            handle.adapter.start_scan(filter.clone()).await?;
            scans.track(handle.adapter.clone());
        }

        loop {
            for handle in &adapters {
                for peripheral in handle.adapter.peripherals().await? {
                    let Some(properties) = peripheral.properties().await? else {
                        continue;
                    };
                    if !matcher.matches(&properties.services) {
                        trace!(device_id = %peripheral.id(), "ignoring non-matching peripheral");
                        continue;
                    }

                    scans.stop().await;
                    let device = found_device(&handle.name, &peripheral, properties);
                    info!(device_id = device.device_id(), "found matching peripheral");
                    return Ok(device);
                }
            }

            sleep(SCAN_POLL_INTERVAL).await;
        }
    }

    #[instrument(skip(self, device), level = "debug", fields(device_id = device.device_id()))]
    async fn connect(
        &self,
        device: &FoundDevice,
    ) -> Result<Box<dyn ConnectedPeripheral>, InteractionError> {
        let (adapter, peripheral) = self.find_peripheral(device.device_id()).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;

        let (services, characteristics_by_uuid) =
            collect_services_and_characteristics(&peripheral).await;
        if let Err(error) = negotiate_session_endpoints(&services, &self.catalog) {
            if let Err(disconnect_error) = peripheral.disconnect().await {
                debug!(
                    ?disconnect_error,
                    "failed to disconnect after endpoint validation error"
                );
            }
            return Err(error);
        }

        info!("connected to BuWizz");
        Ok(Box::new(RealPeripheral {
            device: device.clone(),
            endpoint_presence: endpoint_presence(&services),
            services,
            characteristics_by_uuid,
            adapter,
            peripheral,
        }))
    }
}

fn found_device(adapter_name: &str, peripheral: &Peripheral, properties: PeripheralProperties) -> FoundDevice {
    let scan_identity = scan_identity_from_properties(&properties);
    FoundDevice::new(
        adapter_name,
        peripheral.id().to_string(),
        properties.local_name,
        properties.rssi,
    )
    .with_advertised_services(properties.services)
    .with_scan_identity(scan_identity)
}

fn scan_identity_from_properties(properties: &PeripheralProperties) -> Option<ScanIdentity> {
    properties
        .manufacturer_data
        .get(&BUWIZZ_COMPANY_ID)
        .and_then(|payload| ScanModelHandler::parse_company_payload(payload))
}

/// Active connection to a real peripheral.
#[derive(Debug)]
struct RealPeripheral {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    endpoint_presence: EndpointPresence,
    characteristics_by_uuid: HashMap<Uuid, Characteristic>,
    adapter: Adapter,
    peripheral: Peripheral,
}

impl RealPeripheral {
    fn characteristic_for(&self, uuid: Uuid) -> Result<&Characteristic, InteractionError> {
        self.characteristics_by_uuid
            .get(&uuid)
            .ok_or(InteractionError::UnknownCharacteristic { uuid })
    }
}

#[async_trait]
impl ConnectedPeripheral for RealPeripheral {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn inspect_report(&self) -> InspectReport {
        InspectReport::new(
            self.device.clone(),
            self.services.clone(),
            self.endpoint_presence.clone(),
        )
    }

    #[instrument(skip(self), level = "trace", fields(%characteristic))]
    async fn subscribe(&self, characteristic: Uuid) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(characteristic)?;
        self.peripheral.subscribe(characteristic).await?;
        Ok(())
    }

    #[instrument(skip(self, payload), level = "trace", fields(%characteristic, ?mode, payload_len = payload.len()))]
    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(characteristic)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(characteristic, payload, write_type)
            .await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, InteractionError> {
        let payloads = self
            .peripheral
            .notifications()
            .await?
            .map(|notification| RawPayload::received_now(notification.uuid, notification.value));
        let disconnects = disconnect_signals(self.adapter.events().await?, self.peripheral.id());
        Ok(Box::pin(end_on_disconnect(payloads, disconnects)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

/// Adapter whose scan can be stopped from a detached task.
#[async_trait]
trait ScanControl: Clone + Send + Sync + 'static {
    async fn stop_scanning(&self) -> Result<(), InteractionError>;
}

#[async_trait]
impl ScanControl for Adapter {
    async fn stop_scanning(&self) -> Result<(), InteractionError> {
        self.stop_scan().await?;
        Ok(())
    }
}

/// Tracks adapters with a running scan. Dropping an armed guard (a timed-out
/// or failed discovery) stops them on the current runtime.
#[derive(Debug)]
struct ScanGuard<S: ScanControl> {
    adapters: Vec<S>,
    armed: bool,
}

impl<S: ScanControl> Default for ScanGuard<S> {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            armed: true,
        }
    }
}

impl<S: ScanControl> ScanGuard<S> {
    fn track(&mut self, adapter: S) {
        self.adapters.push(adapter);
    }

    async fn stop(mut self) {
        self.armed = false;
        stop_scans(&self.adapters).await;
    }
}

impl<S: ScanControl> Drop for ScanGuard<S> {
    fn drop(&mut self) {
        if !self.armed || self.adapters.is_empty() {
            return;
        }
        let adapters = std::mem::take(&mut self.adapters);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { stop_scans(&adapters).await });
            }
            Err(error) => warn!(%error, "scan left running: no runtime to stop it on"),
        }
    }
}

async fn stop_scans<S: ScanControl>(adapters: &[S]) {
    for adapter in adapters {
        if let Err(error) = adapter.stop_scanning().await {
            debug!(?error, "failed to stop adapter scan cleanly");
        }
    }
}

fn disconnect_signals(
    events: impl Stream<Item = CentralEvent> + Send + 'static,
    peripheral_id: PeripheralId,
) -> impl Stream<Item = ()> + Send + 'static {
    events.filter_map(move |event| match event {
        CentralEvent::DeviceDisconnected(id) if id == peripheral_id => {
            info!(device_id = %id, "peripheral disconnected");
            Some(())
        }
        _ => None,
    })
}

/// Yields `payloads` until either they run out or `disconnects` fires.
fn end_on_disconnect<T: Send + 'static>(
    payloads: impl Stream<Item = T> + Send + 'static,
    disconnects: impl Stream<Item = ()> + Send + 'static,
) -> impl Stream<Item = T> + Send + 'static {
    payloads
        .map(Some)
        .chain(tokio_stream::once(None))
        .merge(disconnects.map(|()| None))
        .map_while(|item| item)
}

async fn collect_services_and_characteristics(
    peripheral: &Peripheral,
) -> (Vec<ServiceInfo>, HashMap<Uuid, Characteristic>) {
    let mut services = Vec::new();
    let mut characteristics_by_uuid = HashMap::new();

    for service in peripheral.services() {
        let mut characteristics = Vec::new();
        for characteristic in &service.characteristics {
            characteristics_by_uuid
                .entry(characteristic.uuid)
                .or_insert_with(|| characteristic.clone());

            characteristics.push(read_characteristic(peripheral, characteristic).await);
        }
        characteristics.sort_by_key(CharacteristicInfo::uuid);

        services.push(ServiceInfo::new(service.uuid, service.primary, characteristics));
    }
    services.sort_by_key(ServiceInfo::uuid);

    (services, characteristics_by_uuid)
}

#[instrument(skip_all, level = "debug", fields(characteristic = %characteristic.uuid))]
async fn read_characteristic(
    peripheral: &Peripheral,
    characteristic: &Characteristic,
) -> CharacteristicInfo {
    let mut info = CharacteristicInfo::new(
        characteristic.uuid,
        property_labels(characteristic.properties),
    );
    if characteristic.properties.contains(CharPropFlags::READ) {
        let value = ReadValue::from_result(peripheral.read(characteristic).await);
        if let ReadValue::Failed { error } = &value {
            warn!(%error, "failed to read characteristic value");
        }
        info = info.with_value(value);
    }

    let mut descriptors = Vec::with_capacity(characteristic.descriptors.len());
    for descriptor in &characteristic.descriptors {
        let value = ReadValue::from_result(peripheral.read_descriptor(descriptor).await);
        if let ReadValue::Failed { error } = &value {
            warn!(descriptor = %descriptor.uuid, %error, "failed to read descriptor value");
        }
        descriptors.push(DescriptorInfo::new(descriptor.uuid, value));
    }
    info.with_descriptors(descriptors)
}

fn property_labels(flags: CharPropFlags) -> Vec<String> {
    let labels: Vec<String> = flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if labels.is_empty() {
        vec!["none".to_string()]
    } else {
        labels
    }
}
