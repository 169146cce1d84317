mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;
mod scan_model;
mod session;

pub use self::fake_backend::{
    FakeBackendConfig, FakeHardwareClient, NotificationPayloads, ScanFixture, WriteLog,
};
pub(crate) use self::hardware::{HardwareBackend, hardware_client_from_backend};
pub use self::hardware::{ConnectedPeripheral, HardwareClient, NotificationStream, WriteMode};
pub use self::model::{
    CharacteristicInfo, DescriptorInfo, EndpointPresence, FoundDevice, InspectReport, ReadValue,
    ServiceInfo,
};
pub use self::scan_model::{AdvertisedMode, ScanIdentity, ScanModelHandler};
