use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use buwizz::{
    CommandCode, DecodeError, DeviceName, DeviceNameHandler, FakeBackendConfig, FakeHardwareClient,
    HardwareClient, OutboundCommand, ProtocolError, SessionConfig, SessionDriver, SessionEnd,
    SessionError, SessionEvent, SessionHandle, SessionState, WriteLog, default_catalog,
};

const BUWIZZ_FIXTURE: &str = "hci0|AA:BB:CC|BuWizz3|-43|500592d1-74fb-4481-88b3-9919b1676e93";
const OTHER_FIXTURE: &str = "hci0|00:11:22|Speaker|-65|0000180f-0000-1000-8000-00805f9b34fb";

fn status_report_hex() -> String {
    let mut payload = [0u8; 54];
    payload[0] = 0x01;
    payload[1] = 0b0101_1000;
    payload[2] = 0x50;
    payload[9] = 0x19;
    hex::encode(payload)
}

fn fake_client(
    scan: &str,
    notifications: Option<&str>,
) -> anyhow::Result<(Arc<dyn HardwareClient>, WriteLog)> {
    let config = FakeBackendConfig::builder()
        .scan_fixture(scan.parse()?)
        .maybe_notifications(notifications.map(str::parse).transpose()?)
        .build();
    let client = FakeHardwareClient::new(config, default_catalog());
    let writes = client.writes();
    Ok((Arc::new(client), writes))
}

fn spawn_collecting(
    client: Arc<dyn HardwareClient>,
    config: SessionConfig,
) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
    let (events_tx, events) = mpsc::unbounded_channel();
    let handle = SessionDriver::spawn(client, config, move |event: SessionEvent| {
        let _ = events_tx.send(event);
    });
    (handle, events)
}

#[tokio::test(start_paused = true)]
async fn scan_without_matching_device_ends_after_timeout() -> anyhow::Result<()> {
    let (client, _writes) = fake_client(OTHER_FIXTURE, None)?;
    let config = SessionConfig::builder()
        .scan_timeout(Duration::from_secs(3))
        .build();
    let (handle, mut events) = spawn_collecting(client, config);

    assert_eq!(
        SessionState::Scanning,
        handle.wait_for_state(SessionState::Scanning).await
    );
    let started = tokio::time::Instant::now();

    assert_eq!(
        Some(SessionEvent::Ended(SessionEnd::NoDeviceFound)),
        events.recv().await
    );
    assert!(started.elapsed() >= Duration::from_secs(3));

    let summary = handle.join().await?;
    assert_eq!(&SessionEnd::NoDeviceFound, summary.end());
    assert_eq!(None, summary.device());
    assert_eq!(None, events.recv().await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn truncated_then_valid_payload_yields_error_then_report() -> anyhow::Result<()> {
    let notifications = format!("01,{}", status_report_hex());
    let (client, _writes) = fake_client(BUWIZZ_FIXTURE, Some(&notifications))?;
    let (handle, mut events) = spawn_collecting(client, SessionConfig::default());

    assert_matches!(
        events.recv().await,
        Some(SessionEvent::Telemetry(Err(DecodeError::Truncated {
            expected: 22,
            actual: 1
        })))
    );
    assert_eq!(SessionState::Subscribed, handle.state());

    let Some(SessionEvent::Telemetry(Ok(report))) = events.recv().await else {
        panic!("expected a decoded report");
    };
    assert!(report.flags.usb_connected);
    assert!((report.battery_voltage - 13.0).abs() < 1e-4);
    assert_eq!(25, report.controller_temperature);
    assert_eq!(SessionState::Subscribed, handle.state());

    handle.stop();
    assert_eq!(
        Some(SessionEvent::Ended(SessionEnd::Stopped)),
        events.recv().await
    );
    let summary = handle.join().await?;
    assert_eq!(1, summary.stats().reports);
    assert_eq!(1, summary.stats().decode_errors);
    assert_eq!(
        Some("AA:BB:CC"),
        summary.device().map(|device| device.device_id())
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn send_before_subscription_is_rejected() -> anyhow::Result<()> {
    let config = FakeBackendConfig::builder()
        .scan_fixture(BUWIZZ_FIXTURE.parse()?)
        .discovery_delay(Duration::from_secs(1))
        .build();
    let client: Arc<dyn HardwareClient> =
        Arc::new(FakeHardwareClient::new(config, default_catalog()));
    let (handle, _events) = spawn_collecting(client, SessionConfig::default());

    let result = handle
        .send(OutboundCommand::SetDeviceName(DeviceName::new("Crane")?))
        .await;

    assert_eq!(
        Err(SessionError::NotReady {
            state: SessionState::Scanning
        }),
        result
    );
    handle.stop();
    handle.join().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rename_writes_encoded_frame_to_peripheral() -> anyhow::Result<()> {
    let (client, writes) = fake_client(BUWIZZ_FIXTURE, None)?;
    let (handle, _events) = spawn_collecting(client, SessionConfig::default());

    assert_eq!(
        SessionState::Subscribed,
        handle.wait_for_state(SessionState::Subscribed).await
    );
    DeviceNameHandler::set_name(&handle, DeviceName::new("Crane")?).await?;

    let mut expected = vec![0x20, b'C', b'r', b'a', b'n', b'e'];
    expected.resize(13, 0);
    assert_eq!(vec![expected], writes.frames());

    handle.stop();
    assert_eq!(&SessionEnd::Stopped, handle.join().await?.end());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_raw_command_is_rejected_without_writing() -> anyhow::Result<()> {
    let (client, writes) = fake_client(BUWIZZ_FIXTURE, None)?;
    let (handle, _events) = spawn_collecting(client, SessionConfig::default());
    handle.wait_for_state(SessionState::Subscribed).await;

    let result = DeviceNameHandler::set_name(&handle, DeviceName::new("Crane")?).await;
    assert_matches!(result, Ok(()));
    let raw = handle
        .send(OutboundCommand::Raw {
            code: CommandCode::from(0x42),
            payload: vec![1, 2, 3],
        })
        .await;

    assert_matches!(raw, Err(SessionError::Encode(_)));
    assert_eq!(1, writes.frames().len());
    handle.stop();
    handle.join().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_twice_ends_session_once() -> anyhow::Result<()> {
    let (client, _writes) = fake_client(BUWIZZ_FIXTURE, None)?;
    let (handle, mut events) = spawn_collecting(client, SessionConfig::default());
    handle.wait_for_state(SessionState::Subscribed).await;

    handle.stop();
    handle.stop();
    let summary = handle.join().await?;

    let mut ended = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Ended(_)) {
            ended += 1;
        }
    }
    assert_eq!(1, ended);
    assert_eq!(&SessionEnd::Stopped, summary.end());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn send_after_session_ends_reports_disconnected() -> anyhow::Result<()> {
    let (client, _writes) = fake_client(OTHER_FIXTURE, None)?;
    let config = SessionConfig::builder()
        .scan_timeout(Duration::from_millis(100))
        .build();
    let (handle, _events) = spawn_collecting(client, config);
    handle.wait_for_state(SessionState::Disconnected).await;

    let result = DeviceNameHandler::set_name(&handle, DeviceName::new("Crane")?).await;

    assert_matches!(
        result,
        Err(ProtocolError::Session(error)) if *error == SessionError::NotReady { state: SessionState::Disconnected }
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn device_disconnect_ends_session_once_without_later_telemetry() -> anyhow::Result<()> {
    let notifications = format!("{},{}", status_report_hex(), status_report_hex());
    let config = FakeBackendConfig::builder()
        .scan_fixture(BUWIZZ_FIXTURE.parse()?)
        .notifications(notifications.parse()?)
        .disconnect_after_notifications(true)
        .build();
    let client: Arc<dyn HardwareClient> =
        Arc::new(FakeHardwareClient::new(config, default_catalog()));
    let (handle, mut events) = spawn_collecting(client, SessionConfig::default());

    let summary = handle.join().await?;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    let ended: Vec<usize> = received
        .iter()
        .enumerate()
        .filter(|(_, event)| matches!(event, SessionEvent::Ended(_)))
        .map(|(position, _)| position)
        .collect();
    assert_eq!(vec![received.len() - 1], ended);
    assert_matches!(
        received.last(),
        Some(SessionEvent::Ended(SessionEnd::Disconnected { cause: Some(_) }))
    );
    assert_eq!(
        2,
        received
            .iter()
            .filter(|event| matches!(event, SessionEvent::Telemetry(Ok(_))))
            .count()
    );

    assert_matches!(summary.end(), SessionEnd::Disconnected { .. });
    assert_eq!(2, summary.stats().reports);
    Ok(())
}
