use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::Stream;
use tracing::info;
use uuid::Uuid;

use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackendConfig, FakeHardwareClient};
use super::model::{FoundDevice, InspectReport};
use crate::error::InteractionError;
use crate::layout::LayoutCatalog;
use crate::matcher::DeviceMatcher;
use crate::notification::RawPayload;

/// Notifications delivered by a connected peripheral.
pub type NotificationStream = Pin<Box<dyn Stream<Item = RawPayload> + Send>>;

/// BLE write mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum WriteMode {
    #[default]
    WithResponse,
    WithoutResponse,
}

/// Runtime BLE backend selection.
#[derive(Debug)]
pub(crate) enum HardwareBackend {
    Real,
    Fake(FakeBackendConfig),
}

/// Builds an injected hardware client for the selected runtime backend.
pub(crate) async fn hardware_client_from_backend(
    backend: HardwareBackend,
    catalog: Arc<LayoutCatalog>,
) -> Result<Arc<dyn HardwareClient>, InteractionError> {
    let client: Arc<dyn HardwareClient> = match backend {
        HardwareBackend::Real => Arc::new(BtleplugBackend::new(catalog).await?),
        HardwareBackend::Fake(config) => {
            info!("using fake BLE backend");
            Arc::new(FakeHardwareClient::new(config, catalog))
        }
    };

    Ok(client)
}

/// Discovers and connects BuWizz peripherals.
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Scans until a device accepted by `matcher` appears.
    ///
    /// Never resolves while nothing matches; callers bound it with a timeout.
    async fn discover(&self, matcher: &DeviceMatcher) -> Result<FoundDevice, InteractionError>;

    /// Connects to `device` and verifies its application endpoints.
    async fn connect(
        &self,
        device: &FoundDevice,
    ) -> Result<Box<dyn ConnectedPeripheral>, InteractionError>;
}

/// An established GATT connection.
#[async_trait]
pub trait ConnectedPeripheral: Send + Sync {
    fn device(&self) -> &FoundDevice;

    /// Describes discovered services and endpoint presence.
    fn inspect_report(&self) -> InspectReport;

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), InteractionError>;

    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError>;

    /// Returns the notification stream; it ends when the link drops.
    async fn notifications(&self) -> Result<NotificationStream, InteractionError>;

    async fn close(self: Box<Self>) -> Result<(), InteractionError>;
}
