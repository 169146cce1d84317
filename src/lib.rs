mod app;
mod cli;
mod error;
mod handlers;
mod hw;
mod layout;
mod matcher;
mod notification;
mod protocol;
mod report;
mod session;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    fake_hardware_client, hardware_client, run, run_with_clients, run_with_clients_and_log_level,
    run_with_log_level,
};
pub use cli::{
    Args, Command, ControlAction, ControlArgs, FakeArgs, InspectArgs, LedsArgs, ListenArgs,
    LogLevel, OutputFormat, SetNameArgs,
};
pub use error::{FixtureError, InteractionError, ProtocolError};
pub use handlers::{
    CommandCodec, DeviceName, DeviceNameError, DeviceNameHandler, EncodeError, LED_COUNT,
    LedColourError, LedStatus, LedStatusHandler, OutboundCommand, Rgb,
};
pub use hw::{
    AdvertisedMode, CharacteristicInfo, ConnectedPeripheral, DescriptorInfo, EndpointPresence,
    FakeBackendConfig, FakeHardwareClient, FoundDevice, HardwareClient, InspectReport,
    NotificationPayloads, NotificationStream, ReadValue, ScanFixture, ScanIdentity,
    ScanModelHandler, ServiceInfo, WriteLog, WriteMode,
};
pub use layout::{
    AccelerometerLayout, BitSpan, BlockArray, ByteSpan, CommandLayout, Endianness,
    LayoutCatalog, LinearScale, StatusFlagBits, StatusReportLayout, default_catalog,
};
pub use matcher::DeviceMatcher;
pub use notification::{DecodeError, RawPayload, StatusReportDecoder, decode};
pub use protocol::{
    APPLICATION_CHARACTERISTIC_UUID, APPLICATION_SERVICE_UUID, CommandCode, EndpointId,
};
pub use report::{
    AUX_MOTOR_CHANNELS, AccelerometerSample, AuxMotorState, BatteryLevel, BootloaderResponse,
    DeviceStatusReport, MOTOR_OUTPUTS, MotorCurrents, PidControllerState, StatusFlags,
};
pub use session::{
    DEFAULT_SCAN_TIMEOUT, LinkRequest, QueuedLink, SessionConfig, SessionConsumer, SessionDriver,
    SessionEnd, SessionError, SessionEvent, SessionHandle, SessionState, SessionStateMachine,
    SessionStats, SessionSummary, TransportEvent, TransportLink,
};
pub use terminal::TerminalClient;
