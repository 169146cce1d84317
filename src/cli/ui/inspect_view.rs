use std::fmt::{self, Display, Formatter};

use crate::hw::{InspectReport, ReadValue};
use crate::protocol;
use crate::utils::format_hex;

use super::device_view::DeviceView;
use super::painter::Painter;
use super::table::Table;

/// Renders a full inspect report with device, endpoint, and service tables.
pub(crate) struct InspectReportView<'a> {
    report: &'a InspectReport,
    painter: &'a Painter,
}

impl<'a> InspectReportView<'a> {
    pub(crate) fn new(report: &'a InspectReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }

    fn endpoints_table(&self) -> Table {
        let endpoints = self.report.endpoint_presence();
        let rows = protocol::known_endpoints()
            .map(|endpoint| {
                let metadata = protocol::endpoint_metadata(endpoint);
                let status = match (endpoints.is_present(endpoint), endpoint.is_required()) {
                    (true, _) => self.painter.success("present"),
                    (false, true) => self.painter.warning("missing"),
                    (false, false) => self.painter.muted("absent"),
                };
                vec![
                    self.painter.value(metadata.uuid().to_string()),
                    self.painter.muted(metadata.kind().to_string()),
                    self.painter.value(metadata.name()),
                    status,
                ]
            })
            .collect();
        Table::grid(["uuid", "kind", "name", "status"], rows)
    }

    fn services_table(&self) -> Table {
        let mut rows = Vec::new();
        for service in self.report.services() {
            let primary = if service.is_primary() {
                self.painter.success("yes")
            } else {
                self.painter.muted("no")
            };
            if service.characteristics().is_empty() {
                rows.push(vec![
                    self.painter.value(service.uuid().to_string()),
                    primary,
                    self.painter.warning("<none>"),
                    self.painter.warning("<none>"),
                    self.painter.muted("-"),
                ]);
                continue;
            }

            for characteristic in service.characteristics() {
                rows.push(vec![
                    self.painter.value(service.uuid().to_string()),
                    primary.clone(),
                    self.painter.value(characteristic.uuid().to_string()),
                    self.painter.value(characteristic.properties().join(",")),
                    self.read_value(characteristic.value()),
                ]);
            }
        }
        Table::grid(
            [
                "service_uuid",
                "primary",
                "characteristic_uuid",
                "properties",
                "value",
            ],
            rows,
        )
        .or_placeholder(self.painter.muted("<none>"))
    }

    fn descriptors_table(&self) -> Table {
        let rows = self
            .report
            .services()
            .iter()
            .flat_map(|service| service.characteristics())
            .flat_map(|characteristic| {
                characteristic.descriptors().iter().map(move |descriptor| {
                    vec![
                        self.painter.value(characteristic.uuid().to_string()),
                        self.painter.value(descriptor.uuid().to_string()),
                        self.read_value(Some(descriptor.value())),
                    ]
                })
            })
            .collect();
        Table::grid(["characteristic_uuid", "descriptor_uuid", "value"], rows)
            .or_placeholder(self.painter.muted("<none>"))
    }

    fn read_value(&self, value: Option<&ReadValue>) -> String {
        match value {
            None => self.painter.muted("-"),
            Some(ReadValue::Read { bytes }) => self.painter.value(format_hex(bytes)),
            Some(ReadValue::Failed { error }) => {
                self.painter.failure(format!("read failed: {error}"))
            }
        }
    }
}

impl Display for InspectReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let device = DeviceView::new(self.report.device(), self.painter);

        write!(f, "{}", self.painter.heading("Connected device:"))?;
        write!(f, "\n{device}")?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("BuWizz endpoints:"))?;
        write!(f, "\n{}", self.endpoints_table())?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Discovered GATT services:"))?;
        write!(f, "\n{}", self.services_table())?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Descriptors:"))?;
        write!(f, "\n{}", self.descriptors_table())
    }
}

#[cfg(test)]
mod tests {
    use crate::hw::{
        CharacteristicInfo, DescriptorInfo, EndpointPresence, FoundDevice, ServiceInfo,
    };
    use crate::protocol::{APPLICATION_CHARACTERISTIC_UUID, APPLICATION_SERVICE_UUID, EndpointId};

    use super::*;

    fn device() -> FoundDevice {
        FoundDevice::new("hci0", "AA:BB:CC", Some("BuWizz3".to_string()), Some(-43))
    }

    #[test]
    fn inspect_report_renders_all_sections() {
        let services = vec![ServiceInfo::new(
            APPLICATION_SERVICE_UUID,
            true,
            vec![CharacteristicInfo::new(
                APPLICATION_CHARACTERISTIC_UUID,
                vec!["write".into(), "notify".into()],
            )],
        )];
        let mut presence = protocol::empty_presence_map();
        presence.insert(EndpointId::ApplicationService, true);
        presence.insert(EndpointId::ApplicationCharacteristic, true);
        let report = InspectReport::new(device(), services, EndpointPresence::new(presence));

        let painter = Painter::new(false);
        let rendered = InspectReportView::new(&report, &painter).to_string();

        assert!(rendered.starts_with("Connected device:"));
        assert!(rendered.contains("BuWizz endpoints:"));
        assert!(rendered.contains("Discovered GATT services:"));
        assert!(rendered.contains("50052901-74fb-4481-88b3-9919b1676e93"));
        assert!(rendered.contains("write,notify"));
        assert!(rendered.contains("present"));
        assert!(rendered.contains("absent"));
        assert!(!rendered.contains("missing"));
    }

    #[test]
    fn service_without_characteristics_marks_required_endpoints_missing() {
        let services = vec![ServiceInfo::new(
            uuid::Uuid::from_u128(0x0000_1800_0000_1000_8000_0080_5f9b_34fb),
            false,
            vec![],
        )];
        let report = InspectReport::new(
            device(),
            services,
            EndpointPresence::new(protocol::empty_presence_map()),
        );

        let painter = Painter::new(false);
        let rendered = InspectReportView::new(&report, &painter).to_string();

        assert!(rendered.contains("<none>"));
        assert!(rendered.contains("missing"));
    }

    #[test]
    fn read_values_and_failures_render_next_to_their_attributes() {
        let firmware = CharacteristicInfo::new(
            uuid::Uuid::from_u128(0x0000_2a26_0000_1000_8000_0080_5f9b_34fb),
            vec!["read".into()],
        )
        .with_value(ReadValue::Read {
            bytes: b"3.21".to_vec(),
        });
        let telemetry = CharacteristicInfo::new(
            APPLICATION_CHARACTERISTIC_UUID,
            vec!["write".into(), "notify".into()],
        )
        .with_descriptors(vec![DescriptorInfo::new(
            uuid::Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb),
            ReadValue::Failed {
                error: "insufficient authentication".into(),
            },
        )]);
        let report = InspectReport::new(
            device(),
            vec![ServiceInfo::new(APPLICATION_SERVICE_UUID, true, vec![firmware, telemetry])],
            EndpointPresence::new(protocol::empty_presence_map()),
        );

        let painter = Painter::new(false);
        let rendered = InspectReportView::new(&report, &painter).to_string();

        assert!(rendered.contains("33 2E 32 31"));
        assert!(rendered.contains("Descriptors:"));
        assert!(rendered.contains("00002902-0000-1000-8000-00805f9b34fb"));
        assert!(rendered.contains("read failed: insufficient authentication"));
    }
}
