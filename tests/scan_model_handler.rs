use pretty_assertions::assert_eq;
use rstest::rstest;

use buwizz::{AdvertisedMode, DeviceMatcher, EndpointId, ScanModelHandler};

const BUWIZZ_FIXTURE: &str = "hci0|AA:BB:CC|BuWizz3|-43|500592d1-74fb-4481-88b3-9919b1676e93";

#[rstest]
#[case::application(
    &[0x05, 0x4E, b'B', b'W', 0x01, 0x07, 0x34, 0x12],
    Some(AdvertisedMode::Application { firmware: [1, 7], serial_low: 0x1234 })
)]
#[case::bootloader(&[0x05, 0x4E, b'B', b'W', b'B', b'L', 0x00, 0x00], Some(AdvertisedMode::Bootloader))]
#[case::other_company(&[0x4C, 0x00, b'B', b'W', 0x01, 0x07, 0x34, 0x12], None)]
#[case::missing_signature(&[0x05, 0x4E, b'X', b'Y', 0x01, 0x07, 0x34, 0x12], None)]
#[case::short_record(&[0x05, 0x4E, b'B', b'W'], None)]
fn scan_identity_parsing_handles_manufacturer_records(
    #[case] record: &[u8],
    #[case] expected_mode: Option<AdvertisedMode>,
) {
    let identity = ScanModelHandler::parse_identity(record);
    assert_eq!(expected_mode, identity.map(|value| value.mode));
}

#[tokio::test]
async fn fake_client_discovers_and_inspects_buwizz() -> anyhow::Result<()> {
    let fake_args = buwizz::FakeArgs::builder()
        .scan_fixture(&format!(
            "hci1|00:11:22|Speaker|-65|-;{BUWIZZ_FIXTURE}"
        ))?
        .build();
    let client = buwizz::hardware_client(Some(fake_args)).await?;

    let device = client.discover(&DeviceMatcher::default()).await?;
    assert_eq!("AA:BB:CC", device.device_id());
    assert_eq!(Some("BuWizz3"), device.local_name());

    let peripheral = client.connect(&device).await?;
    let report = peripheral.inspect_report();
    assert!(
        report
            .endpoint_presence()
            .is_present(EndpointId::ApplicationService)
    );
    assert!(
        report
            .endpoint_presence()
            .is_present(EndpointId::ApplicationCharacteristic)
    );
    assert!(
        !report
            .endpoint_presence()
            .is_present(EndpointId::BootloaderCharacteristic)
    );
    peripheral.close().await?;
    Ok(())
}
