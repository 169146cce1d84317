use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cli::OutputFormat;
use crate::cli::command::parse_duration;
use crate::handlers::{
    DeviceName, DeviceNameHandler, LED_COUNT, LedStatus, LedStatusHandler, Rgb,
};
use crate::hw::HardwareClient;
use crate::layout::LayoutCatalog;
use crate::session::{
    DEFAULT_SCAN_TIMEOUT, SessionConfig, SessionDriver, SessionEvent, SessionHandle, SessionState,
};
use crate::terminal::TerminalClient;

use super::ui::Painter;

/// JSON result emitted by a `control` action.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlResult {
    SetName { device_id: String, name: String },
    Leds { device_id: String, colours: Vec<String> },
}

impl ControlResult {
    fn describe(&self, painter: &Painter) -> String {
        match self {
            Self::SetName { device_id, name } => format!(
                "{} Renamed {} to {}",
                painter.success("✓"),
                painter.value(device_id),
                painter.value(name)
            ),
            Self::Leds { device_id, colours } => format!(
                "{} Set LEDs on {} to {}",
                painter.success("✓"),
                painter.value(device_id),
                painter.value(colours.join(" "))
            ),
        }
    }
}

/// Arguments for the `control` command.
#[derive(Debug, Args)]
pub struct ControlArgs {
    #[command(subcommand)]
    action: ControlAction,
    /// How long to scan before giving up (e.g. `5s`, `1m`).
    #[arg(long, global = true, default_value = "5s", value_parser = parse_duration)]
    scan_timeout: Duration,
}

impl ControlArgs {
    /// Creates control arguments for one action.
    ///
    /// ```
    /// use buwizz::{ControlAction, ControlArgs, DeviceName};
    ///
    /// let args = ControlArgs::new(ControlAction::set_name(DeviceName::new("Crane")?));
    /// let _ = args;
    /// # Ok::<(), buwizz::DeviceNameError>(())
    /// ```
    #[must_use]
    pub fn new(action: ControlAction) -> Self {
        Self {
            action,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }
}

/// Action performed by the `control` command.
#[derive(Debug, Subcommand)]
pub enum ControlAction {
    /// Rename the device (1 to 12 printable ASCII characters).
    SetName(SetNameArgs),
    /// Set the four status LEDs, each as `RRGGBB`.
    Leds(LedsArgs),
}

impl ControlAction {
    #[must_use]
    pub fn set_name(name: DeviceName) -> Self {
        Self::SetName(SetNameArgs { name })
    }

    #[must_use]
    pub fn leds(status: LedStatus) -> Self {
        Self::Leds(LedsArgs {
            colours: status.colours().to_vec(),
        })
    }
}

/// Arguments for `control set-name`.
#[derive(Debug, Args)]
pub struct SetNameArgs {
    name: DeviceName,
}

/// Arguments for `control leds`.
#[derive(Debug, Args)]
pub struct LedsArgs {
    #[arg(num_args = LED_COUNT, required = true, value_name = "RRGGBB")]
    colours: Vec<Rgb>,
}

impl LedsArgs {
    fn status(&self) -> Result<LedStatus> {
        let Ok(colours) = <[Rgb; LED_COUNT]>::try_from(self.colours.as_slice()) else {
            bail!(
                "expected {LED_COUNT} colours, got {}",
                self.colours.len()
            );
        };
        Ok(LedStatus::new(colours))
    }
}

/// Executes the `control` command.
#[instrument(skip_all, level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    client: Arc<dyn HardwareClient>,
    catalog: Arc<LayoutCatalog>,
    args: &ControlArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let config = SessionConfig::builder()
        .scan_timeout(args.scan_timeout)
        .catalog(catalog)
        .build();
    let session = SessionDriver::spawn(client, config, |event: SessionEvent| match event {
        SessionEvent::WriteFailed { cause } => warn!(%cause, "write failed"),
        SessionEvent::Ended(end) => debug!(%end, "control session ended"),
        SessionEvent::Telemetry(_) => {}
    });

    if session.wait_for_state(SessionState::Subscribed).await != SessionState::Subscribed {
        let summary = session.join().await?;
        bail!("{}", summary.end());
    }

    let result = apply(&session, &args.action).await;
    session.stop();
    session.join().await?;
    let result = result?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", result.describe(&painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &result)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

async fn apply(session: &SessionHandle, action: &ControlAction) -> Result<ControlResult> {
    let device_id = session
        .device()
        .map(|device| device.device_id().to_string())
        .unwrap_or_default();

    match action {
        ControlAction::SetName(SetNameArgs { name }) => {
            DeviceNameHandler::set_name(session, name.clone()).await?;
            Ok(ControlResult::SetName {
                device_id,
                name: name.to_string(),
            })
        }
        ControlAction::Leds(args) => {
            let status = args.status()?;
            LedStatusHandler::set_leds(session, status).await?;
            Ok(ControlResult::Leds {
                device_id,
                colours: status.colours().iter().map(ToString::to_string).collect(),
            })
        }
    }
}
