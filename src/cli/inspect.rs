use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::cli::OutputFormat;
use crate::cli::command::parse_duration;
use crate::error::InteractionError;
use crate::hw::{FoundDevice, HardwareClient};
use crate::layout::LayoutCatalog;
use crate::matcher::DeviceMatcher;
use crate::session::DEFAULT_SCAN_TIMEOUT;
use crate::terminal::TerminalClient;

use super::ui::{InspectReportView, Painter, Spinner};

/// Arguments for the `inspect` command.
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// How long to scan before giving up (e.g. `5s`, `1m`).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    scan_timeout: Duration,
}

impl InspectArgs {
    #[must_use]
    pub fn new(scan_timeout: Duration) -> Self {
        Self { scan_timeout }
    }
}

impl Default for InspectArgs {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_TIMEOUT)
    }
}

/// Executes the `inspect` command.
#[instrument(skip_all, level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    client: Arc<dyn HardwareClient>,
    catalog: &LayoutCatalog,
    args: &InspectArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let matcher = DeviceMatcher::for_catalog(catalog);
    let spinner = Spinner::new(terminal_client.stderr_is_terminal());
    let device = spinner
        .run(
            "Scanning for BuWizz devices",
            discover_within(client.as_ref(), &matcher, args.scan_timeout),
        )
        .await?;
    debug!(device_id = device.device_id(), "connecting");
    let peripheral = spinner
        .run("Connecting", client.connect(&device))
        .await?;
    let report = peripheral.inspect_report();
    peripheral.close().await?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", InspectReportView::new(&report, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

async fn discover_within(
    client: &dyn HardwareClient,
    matcher: &DeviceMatcher,
    scan_timeout: Duration,
) -> Result<FoundDevice, InteractionError> {
    timeout(scan_timeout, client.discover(matcher))
        .await
        .map_err(|_elapsed| InteractionError::DiscoveryTimedOut {
            timeout: scan_timeout,
        })?
}
