use std::time::{Duration, Instant};

use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::Value;

const BUWIZZ_FIXTURE: &str = "hci0|AA:BB:CC|BuWizz3|-43|500592d1-74fb-4481-88b3-9919b1676e93";
const SPEAKER_FIXTURE: &str = "hci1|00:11:22|Speaker|-65|-";

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl buwizz::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

fn status_report_hex(voltage_raw: u8) -> String {
    let mut payload = [0u8; 54];
    payload[0] = 0x01;
    payload[1] = 0b0101_1000;
    payload[2] = voltage_raw;
    payload[9] = 0x19;
    hex::encode(payload)
}

async fn run_with_parsed_args(
    args: buwizz::Args,
    output_format: buwizz::OutputFormat,
) -> anyhow::Result<String> {
    let mut output = Vec::new();
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let hardware_client = buwizz::hardware_client(maybe_fake_args).await?;
    buwizz::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        hardware_client,
        output_format,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv<const N: usize>(
    argv: [&str; N],
    output_format: buwizz::OutputFormat,
) -> anyhow::Result<String> {
    let parsed_args = buwizz::Args::try_parse_from(argv)?;
    run_with_parsed_args(parsed_args, output_format).await
}

fn json_lines(stdout: &str) -> anyhow::Result<Vec<Value>> {
    Ok(stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<Vec<Value>, _>>()?)
}

#[tokio::test]
async fn inspect_command_prints_gatt_details_from_fake_backend() -> anyhow::Result<()> {
    let fake = buwizz::FakeArgs::builder()
        .scan_fixture(&format!("{SPEAKER_FIXTURE};{BUWIZZ_FIXTURE}"))?
        .build();
    let args = buwizz::Args::new(buwizz::Command::Inspect(buwizz::InspectArgs::default()))
        .with_fake(fake);

    let stdout = run_with_parsed_args(args, buwizz::OutputFormat::Pretty).await?;

    assert!(stdout.starts_with("Connected device:"));
    assert!(stdout.contains("AA:BB:CC"));
    assert!(!stdout.contains("Speaker"));
    assert!(stdout.contains("50052901-74fb-4481-88b3-9919b1676e93"));
    assert!(stdout.contains("write,notify"));
    Ok(())
}

#[tokio::test]
async fn inspect_command_emits_json_report() -> anyhow::Result<()> {
    let stdout = run_with_argv(
        ["buwizz", "--fake", "--fake-scan", BUWIZZ_FIXTURE, "inspect"],
        buwizz::OutputFormat::Json,
    )
    .await?;

    let report: Value = serde_json::from_str(&stdout)?;
    assert_eq!("AA:BB:CC", report["device"]["device_id"]);
    assert_eq!(
        "500592d1-74fb-4481-88b3-9919b1676e93",
        report["services"][0]["uuid"]
    );
    assert_eq!(
        "00002902-0000-1000-8000-00805f9b34fb",
        report["services"][0]["characteristics"][0]["descriptors"][0]["uuid"]
    );
    assert_eq!(
        serde_json::json!({"outcome": "read", "bytes": "332e3231"}),
        report["services"][1]["characteristics"][0]["value"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn inspect_command_times_out_without_matching_device() {
    let result = run_with_argv(
        [
            "buwizz",
            "--fake",
            "--fake-scan",
            SPEAKER_FIXTURE,
            "inspect",
            "--scan-timeout",
            "2s",
        ],
        buwizz::OutputFormat::Pretty,
    )
    .await;

    let error = result.expect_err("no BuWizz in the fixture should time out");
    assert_eq!("no BuWizz device was found within 2s", error.to_string());
}

#[tokio::test]
async fn inspect_command_applies_fake_discovery_delay() -> anyhow::Result<()> {
    let started_at = Instant::now();
    let _ = run_with_argv(
        [
            "buwizz",
            "--fake",
            "--fake-scan",
            BUWIZZ_FIXTURE,
            "--fake-discovery-delay",
            "40ms",
            "inspect",
        ],
        buwizz::OutputFormat::Json,
    )
    .await?;

    assert!(started_at.elapsed() >= Duration::from_millis(40));
    Ok(())
}

#[tokio::test]
async fn listen_command_streams_reports_as_json_lines() -> anyhow::Result<()> {
    let notifications = format!("{},0158,{}", status_report_hex(0x50), status_report_hex(0x40));
    let stdout = run_with_argv(
        [
            "buwizz",
            "--fake",
            "--fake-scan",
            BUWIZZ_FIXTURE,
            "--fake-notifications",
            &notifications,
            "listen",
            "--max-reports",
            "2",
        ],
        buwizz::OutputFormat::Json,
    )
    .await?;

    let lines = json_lines(&stdout)?;
    assert_eq!(4, lines.len());
    assert_eq!("report", lines[0]["event"]);
    assert_eq!("full", lines[0]["report"]["flags"]["battery_level"]);
    assert_eq!("decode_error", lines[1]["event"]);
    assert_eq!(2, lines[1]["index"]);
    assert_eq!("report", lines[2]["event"]);
    assert_eq!(3, lines[2]["index"]);
    assert_eq!("summary", lines[3]["event"]);
    assert_eq!("stopped", lines[3]["end"]["reason"]);
    assert_eq!(2, lines[3]["stats"]["reports"]);
    assert_eq!(1, lines[3]["stats"]["decode_errors"]);
    Ok(())
}

#[tokio::test]
async fn listen_command_prints_pretty_report_lines() -> anyhow::Result<()> {
    let stdout = run_with_argv(
        [
            "buwizz",
            "--fake",
            "--fake-scan",
            BUWIZZ_FIXTURE,
            "listen",
            "--max-reports",
            "1",
        ],
        buwizz::OutputFormat::Pretty,
    )
    .await?;

    assert!(stdout.starts_with("Connected device:"));
    assert!(stdout.contains("[0001] 13.00 V [full,usb]"));
    assert!(stdout.contains("Stopped: stopped by the consumer"));
    assert!(
        stdout
            .lines()
            .any(|line| line.contains("reports") && line.contains(" 1 "))
    );
    Ok(())
}

#[tokio::test]
async fn listen_command_succeeds_when_the_device_disconnects() -> anyhow::Result<()> {
    let notifications = status_report_hex(0x50);
    let stdout = run_with_argv(
        [
            "buwizz",
            "--fake",
            "--fake-scan",
            BUWIZZ_FIXTURE,
            "--fake-notifications",
            &notifications,
            "--fake-disconnect",
            "listen",
        ],
        buwizz::OutputFormat::Json,
    )
    .await?;

    let lines = json_lines(&stdout)?;
    assert_eq!(2, lines.len());
    assert_eq!("report", lines[0]["event"]);
    assert_eq!("summary", lines[1]["event"]);
    assert_eq!("disconnected", lines[1]["end"]["reason"]);
    assert_eq!("notification stream closed", lines[1]["end"]["cause"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn listen_command_fails_when_no_device_is_found() {
    let result = run_with_argv(
        [
            "buwizz",
            "--fake",
            "--fake-scan",
            SPEAKER_FIXTURE,
            "listen",
            "--scan-timeout",
            "1s",
        ],
        buwizz::OutputFormat::Json,
    )
    .await;

    let error = result.expect_err("listen should fail without a device");
    assert_eq!(
        "no matching device was found before the scan timed out",
        error.to_string()
    );
}

#[tokio::test]
async fn control_set_name_reports_json_result() -> anyhow::Result<()> {
    let stdout = run_with_argv(
        [
            "buwizz",
            "--fake",
            "--fake-scan",
            BUWIZZ_FIXTURE,
            "control",
            "set-name",
            "Crane",
        ],
        buwizz::OutputFormat::Json,
    )
    .await?;

    let result: Value = serde_json::from_str(&stdout)?;
    assert_eq!("set_name", result["action"]);
    assert_eq!("AA:BB:CC", result["device_id"]);
    assert_eq!("Crane", result["name"]);
    Ok(())
}

#[tokio::test]
async fn control_leds_prints_confirmation() -> anyhow::Result<()> {
    let stdout = run_with_argv(
        [
            "buwizz",
            "--fake",
            "--fake-scan",
            BUWIZZ_FIXTURE,
            "control",
            "leds",
            "FF0000",
            "00FF00",
            "0000FF",
            "FFFFFF",
        ],
        buwizz::OutputFormat::Pretty,
    )
    .await?;

    assert_eq!(
        "✓ Set LEDs on AA:BB:CC to #FF0000 #00FF00 #0000FF #FFFFFF",
        stdout.trim_end()
    );
    Ok(())
}

#[test]
fn control_set_name_rejects_long_names() {
    let result = buwizz::Args::try_parse_from([
        "buwizz",
        "control",
        "set-name",
        "MuchTooLongName",
    ]);

    let error = result.expect_err("names over twelve characters should fail parsing");
    assert_eq!(clap::error::ErrorKind::ValueValidation, error.kind());
}

#[test]
fn invalid_fixture_is_rejected_by_builder() {
    let result = buwizz::FakeArgs::builder().scan_fixture("invalid-record");
    assert!(matches!(
        result,
        Err(buwizz::FixtureError::InvalidRecordFieldCount)
    ));
}
