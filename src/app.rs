use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::error::InteractionError;
use crate::hw::{
    FakeHardwareClient, HardwareBackend, HardwareClient, hardware_client_from_backend,
};
use crate::layout::default_catalog;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by fake BLE fixtures.
///
/// ```
/// let fake = buwizz::FakeArgs::builder()
///     .scan_fixture("hci0|AA:BB:CC|BuWizz3|-43|500592d1-74fb-4481-88b3-9919b1676e93")?
///     .build();
/// let client = buwizz::fake_hardware_client(fake);
/// let _ = client;
/// # Ok::<(), buwizz::FixtureError>(())
/// ```
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Arc<dyn HardwareClient> {
    Arc::new(FakeHardwareClient::new(
        fake_args.into_backend_config(),
        default_catalog(),
    ))
}

/// Creates the hardware client selected on the command line: the fake
/// backend when `fake_args` is present, the system BLE stack otherwise.
///
/// # Errors
///
/// Returns an error if the system BLE manager cannot be created.
pub async fn hardware_client(
    fake_args: Option<FakeArgs>,
) -> Result<Arc<dyn HardwareClient>, InteractionError> {
    let backend = match fake_args {
        Some(fake_args) => HardwareBackend::Fake(fake_args.into_backend_config()),
        None => HardwareBackend::Real,
    };
    hardware_client_from_backend(backend, default_catalog()).await
}

/// Runs the CLI command against an injected hardware client.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = buwizz::Args::try_parse_from([
///     "buwizz",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|BuWizz3|-43|500592d1-74fb-4481-88b3-9919b1676e93",
///     "inspect",
/// ])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = buwizz::hardware_client(maybe_fake_args).await?;
/// let mut out = Vec::new();
/// buwizz::run(command, &mut out, hardware_client).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    hardware_client: Arc<dyn HardwareClient>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, hardware_client, None, None).await
}

/// Runs the CLI command with optional log-level and output-format overrides.
///
/// Without an explicit format, output is pretty on a terminal and JSON
/// otherwise.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    hardware_client: Arc<dyn HardwareClient>,
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
) -> Result<()>
where
    W: io::Write,
{
    let terminal_client = SystemTerminalClient;
    let output_format = output_format.unwrap_or(if terminal_client.stdout_is_terminal() {
        OutputFormat::Pretty
    } else {
        OutputFormat::Json
    });
    run_with_clients_and_log_level(
        command,
        out,
        &terminal_client,
        hardware_client,
        output_format,
        log_level,
    )
    .await
}

/// Runs the CLI command with injected clients.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Arc<dyn HardwareClient>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        terminal_client,
        hardware_client,
        output_format,
        None,
    )
    .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl buwizz::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = buwizz::Args::try_parse_from([
///     "buwizz",
///     "--log-level",
///     "trace",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|BuWizz3|-43|500592d1-74fb-4481-88b3-9919b1676e93",
///     "listen",
///     "--max-reports",
///     "1",
/// ])?;
/// let log_level = args.log_level();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = buwizz::hardware_client(maybe_fake_args).await?;
/// let mut out = Vec::new();
/// buwizz::run_with_clients_and_log_level(
///     command,
///     &mut out,
///     &FakeTerminal,
///     hardware_client,
///     buwizz::OutputFormat::Json,
///     log_level,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
#[instrument(
    skip(out, terminal_client, hardware_client),
    level = "info",
    fields(command = %command_name(&command), %output_format, ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Arc<dyn HardwareClient>,
    output_format: OutputFormat,
    log_level: Option<LogLevel>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "buwizz",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let catalog = default_catalog();
    match command {
        Command::Inspect(args) => {
            crate::cli::inspect::run(
                hardware_client,
                &catalog,
                &args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Listen(args) => {
            crate::cli::listen::run(
                hardware_client,
                catalog,
                &args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Control(args) => {
            crate::cli::control::run(
                hardware_client,
                catalog,
                &args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Inspect(_args) => "inspect",
        Command::Listen(_args) => "listen",
        Command::Control(_args) => "control",
    }
}
