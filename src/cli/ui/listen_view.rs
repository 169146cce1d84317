use std::fmt::{self, Display, Formatter};

use uuid::Uuid;

use crate::hw::FoundDevice;
use crate::notification::DecodeError;
use crate::protocol;
use crate::report::DeviceStatusReport;
use crate::session::{SessionEnd, SessionSummary};
use crate::utils::format_measurement;

use super::device_view::DeviceView;
use super::painter::Painter;
use super::table::Table;

/// Renders the listen-session readiness output.
pub(crate) struct ListenReadyView<'a> {
    device: &'a FoundDevice,
    characteristic: Uuid,
    painter: &'a Painter,
}

impl<'a> ListenReadyView<'a> {
    pub(crate) fn new(device: &'a FoundDevice, characteristic: Uuid, painter: &'a Painter) -> Self {
        Self {
            device,
            characteristic,
            painter,
        }
    }
}

impl Display for ListenReadyView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let endpoint_name = protocol::endpoint_for_uuid(&self.characteristic)
            .map(|endpoint| protocol::endpoint_metadata(endpoint).name())
            .unwrap_or("custom characteristic");
        let session_table = Table::key_value(
            self.painter,
            vec![(
                "listening_on",
                format!(
                    "{} {}",
                    self.painter.value(self.characteristic.to_string()),
                    self.painter.muted(format!("({endpoint_name})"))
                ),
            )],
        );

        let device = DeviceView::new(self.device, self.painter);

        write!(f, "{}", self.painter.heading("Connected device:"))?;
        write!(f, "\n{device}")?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Listen session:"))?;
        write!(f, "\n{session_table}")
    }
}

/// Renders one decoded status report as a single line.
pub(crate) struct ReportLineView<'a> {
    index: usize,
    report: &'a DeviceStatusReport,
    painter: &'a Painter,
}

impl<'a> ReportLineView<'a> {
    pub(crate) fn new(index: usize, report: &'a DeviceStatusReport, painter: &'a Painter) -> Self {
        Self {
            index,
            report,
            painter,
        }
    }

    fn flag_labels(&self) -> String {
        let flags = &self.report.flags;
        let mut labels = vec![self.painter.battery(flags.battery_level)];
        if flags.usb_connected {
            labels.push("usb".to_string());
        }
        if flags.battery_charging {
            labels.push("charging".to_string());
        }
        if flags.ble_long_range {
            labels.push("long-range".to_string());
        }
        let rendered = labels.join(",");
        if flags.error {
            format!("{rendered},{}", self.painter.failure("error"))
        } else {
            rendered
        }
    }
}

impl Display for ReportLineView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let index_label = self.painter.muted(format!("[{:04}]", self.index));
        let currents = report
            .motor_currents
            .as_slice()
            .iter()
            .map(|amps| format!("{amps:.2}"))
            .collect::<Vec<_>>()
            .join("/");
        let accel = &report.accelerometer;

        write!(
            f,
            "{index_label} {} [{}] {} {} {}",
            self.painter
                .value(format_measurement(report.battery_voltage, 2, "V")),
            self.flag_labels(),
            self.painter
                .value(format!("{} °C", report.controller_temperature)),
            self.painter.muted(format!("motors={currents} A")),
            self.painter.muted(format!(
                "accel=({:.1}, {:.1}, {:.1}) mg",
                accel.x, accel.y, accel.z
            )),
        )
    }
}

/// Renders a payload that could not be decoded.
pub(crate) struct DecodeErrorLineView<'a> {
    index: usize,
    error: &'a DecodeError,
    painter: &'a Painter,
}

impl<'a> DecodeErrorLineView<'a> {
    pub(crate) fn new(index: usize, error: &'a DecodeError, painter: &'a Painter) -> Self {
        Self {
            index,
            error,
            painter,
        }
    }
}

impl Display for DecodeErrorLineView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.painter.muted(format!("[{:04}]", self.index)),
            self.painter.warning("decode_error"),
            self.error
        )
    }
}

/// Renders the listen session summary.
pub(crate) struct ListenSummaryView<'a> {
    summary: &'a SessionSummary,
    painter: &'a Painter,
}

impl<'a> ListenSummaryView<'a> {
    pub(crate) fn new(summary: &'a SessionSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for ListenSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let end = self.summary.end();
        let reason = match end {
            SessionEnd::Stopped => self.painter.success(end.to_string()),
            SessionEnd::Disconnected { .. } => self.painter.warning(end.to_string()),
            _ => self.painter.failure(end.to_string()),
        };
        let stats = self.summary.stats();
        let counters = Table::grid(
            ["counter", "count"],
            vec![
                vec![self.painter.muted("reports"), stats.reports.to_string()],
                vec![
                    self.painter.muted("decode_errors"),
                    stats.decode_errors.to_string(),
                ],
                vec![
                    self.painter.muted("ignored_payloads"),
                    stats.ignored_payloads.to_string(),
                ],
            ],
        )
        .align_right(1);

        write!(f, "{} {reason}", self.painter.heading("Stopped:"))?;
        write!(f, "\n{counters}")
    }
}
