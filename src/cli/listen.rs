use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::cli::OutputFormat;
use crate::cli::command::parse_duration;
use crate::hw::HardwareClient;
use crate::layout::LayoutCatalog;
use crate::notification::DecodeError;
use crate::report::DeviceStatusReport;
use crate::session::{
    DEFAULT_SCAN_TIMEOUT, SessionConfig, SessionDriver, SessionEnd, SessionEvent, SessionState,
    SessionSummary,
};
use crate::terminal::TerminalClient;

use super::ui::{DecodeErrorLineView, ListenReadyView, ListenSummaryView, Painter, ReportLineView};

/// Arguments for the `listen` command.
#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Stop after this many status reports. If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_reports: Option<usize>,
    /// How long to scan before giving up (e.g. `5s`, `1m`).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    scan_timeout: Duration,
}

impl ListenArgs {
    /// Creates listen arguments with an optional report limit.
    #[must_use]
    pub fn new(max_reports: Option<usize>) -> Self {
        Self {
            max_reports,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }
}

/// One streamed JSON line.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ListenRecord<'a> {
    Report {
        index: usize,
        report: &'a DeviceStatusReport,
    },
    DecodeError {
        index: usize,
        error: String,
    },
    Summary {
        #[serde(flatten)]
        summary: &'a SessionSummary,
    },
}

struct ListenOutput<'a, W> {
    out: &'a mut W,
    painter: Painter,
    format: OutputFormat,
}

impl<W: io::Write> ListenOutput<'_, W> {
    fn record(&mut self, record: &ListenRecord<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut *self.out, record)?;
        writeln!(self.out)
    }

    fn report(&mut self, index: usize, report: &DeviceStatusReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Pretty => writeln!(
                self.out,
                "{}",
                ReportLineView::new(index, report, &self.painter)
            ),
            OutputFormat::Json => self.record(&ListenRecord::Report { index, report }),
        }
    }

    fn decode_error(&mut self, index: usize, error: &DecodeError) -> io::Result<()> {
        match self.format {
            OutputFormat::Pretty => writeln!(
                self.out,
                "{}",
                DecodeErrorLineView::new(index, error, &self.painter)
            ),
            OutputFormat::Json => self.record(&ListenRecord::DecodeError {
                index,
                error: error.to_string(),
            }),
        }
    }

    fn summary(&mut self, summary: &SessionSummary) -> io::Result<()> {
        match self.format {
            OutputFormat::Pretty => {
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    "{}",
                    ListenSummaryView::new(summary, &self.painter)
                )
            }
            OutputFormat::Json => self.record(&ListenRecord::Summary { summary }),
        }
    }
}

/// Executes the `listen` command.
#[instrument(skip_all, level = "info", fields(max_reports = ?args.max_reports))]
pub(crate) async fn run<W>(
    client: Arc<dyn HardwareClient>,
    catalog: Arc<LayoutCatalog>,
    args: &ListenArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let telemetry_characteristic = catalog.telemetry_characteristic();
    let config = SessionConfig::builder()
        .scan_timeout(args.scan_timeout)
        .catalog(catalog)
        .build();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let session = SessionDriver::spawn(client, config, move |event: SessionEvent| {
        let _ = events_tx.send(event);
    });

    let mut output = ListenOutput {
        out,
        painter: Painter::new(terminal_client.stdout_is_terminal()),
        format: output_format,
    };
    let mut index = 0usize;
    let mut reports = 0usize;
    let mut announced = false;
    let mut write_error: Option<io::Error> = None;
    let mut interrupted = false;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                info!("interrupted; stopping session");
                session.stop();
                continue;
            }
        };
        let Some(event) = event else {
            break;
        };

        if !announced
            && output_format == OutputFormat::Pretty
            && session.state() == SessionState::Subscribed
            && let Some(device) = session.device()
        {
            announced = true;
            let ready = ListenReadyView::new(&device, telemetry_characteristic, &output.painter);
            if let Err(error) = writeln!(output.out, "{ready}\n") {
                write_error.get_or_insert(error);
            }
        }

        match event {
            SessionEvent::Telemetry(result) => {
                if args.max_reports.is_some_and(|limit| reports >= limit) {
                    continue;
                }
                index += 1;
                let written = match &result {
                    Ok(report) => {
                        reports += 1;
                        output.report(index, report)
                    }
                    Err(error) => output.decode_error(index, error),
                };
                if let Err(error) = written {
                    write_error.get_or_insert(error);
                    session.stop();
                }
                if args.max_reports.is_some_and(|limit| reports >= limit) {
                    session.stop();
                }
            }
            SessionEvent::WriteFailed { cause } => warn!(%cause, "write failed"),
            SessionEvent::Ended(_end) => break,
        }
    }

    let summary = session.join().await?;
    if let Some(error) = write_error {
        return Err(error.into());
    }
    output.summary(&summary)?;

    match summary.end() {
        SessionEnd::Stopped | SessionEnd::Disconnected { .. } => Ok(()),
        end => bail!("{end}"),
    }
}
