use std::fmt::{self, Display, Formatter};

use crate::hw::{AdvertisedMode, FoundDevice, ScanIdentity};
use crate::utils::format_rssi;

use super::painter::Painter;
use super::table::Table;

/// Renders a `FoundDevice` as a key-value table.
pub(crate) struct DeviceView<'a> {
    device: &'a FoundDevice,
    painter: &'a Painter,
}

impl<'a> DeviceView<'a> {
    pub(crate) fn new(device: &'a FoundDevice, painter: &'a Painter) -> Self {
        Self { device, painter }
    }

    fn mode(&self) -> String {
        match self.device.scan_identity() {
            Some(identity) if identity.is_bootloader() => {
                self.painter.warning(describe_identity(identity))
            }
            Some(identity) => self.painter.value(describe_identity(identity)),
            None => self.painter.muted("<unknown>"),
        }
    }
}

fn describe_identity(identity: &ScanIdentity) -> String {
    match identity.mode {
        AdvertisedMode::Application {
            firmware: [major, minor],
            serial_low,
        } => format!("application (firmware {major}.{minor}, serial ..{serial_low:04X})"),
        AdvertisedMode::Bootloader => "bootloader".to_string(),
    }
}

impl Display for DeviceView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = self.device.local_name().unwrap_or("<unknown>");
        let table = Table::key_value(
            self.painter,
            vec![
                ("adapter", self.painter.value(self.device.adapter_name())),
                ("device_id", self.painter.value(self.device.device_id())),
                ("name", self.painter.value(name)),
                ("rssi", self.painter.value(format_rssi(self.device.rssi()))),
                ("mode", self.mode()),
            ],
        );
        write!(f, "{table}")
    }
}
