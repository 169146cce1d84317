use serde::Serialize;

/// Company identifier prefix of every BuWizz manufacturer record (`05 4E`).
pub(crate) const BUWIZZ_COMPANY_ID: u16 = 0x4E05;

const SIGNATURE: [u8; 2] = *b"BW";
const BOOTLOADER_MARKER: [u8; 2] = *b"BL";
const MANUFACTURER_RECORD_LEN: usize = 8;

/// Firmware mode advertised by the device.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdvertisedMode {
    /// Running the BuWizz application.
    Application {
        /// Firmware version bytes `x.y`.
        firmware: [u8; 2],
        /// Lower 16 bits of the device serial number.
        serial_low: u16,
    },
    /// Waiting in the bootloader.
    Bootloader,
}

/// Device identity parsed from the manufacturer advertisement record.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct ScanIdentity {
    #[serde(flatten)]
    pub mode: AdvertisedMode,
}

impl ScanIdentity {
    /// Returns whether the device advertised bootloader mode.
    #[must_use]
    pub fn is_bootloader(&self) -> bool {
        matches!(self.mode, AdvertisedMode::Bootloader)
    }
}

/// Parses scan advertisement identity fields.
pub struct ScanModelHandler;

impl ScanModelHandler {
    /// Parses identity fields from the 8-byte manufacturer record.
    ///
    /// ```
    /// use buwizz::{AdvertisedMode, ScanModelHandler};
    ///
    /// let record = [0x05, 0x4E, b'B', b'W', 0x01, 0x07, 0x34, 0x12];
    /// let identity = ScanModelHandler::parse_identity(&record);
    /// assert_eq!(
    ///     Some(AdvertisedMode::Application { firmware: [1, 7], serial_low: 0x1234 }),
    ///     identity.map(|identity| identity.mode)
    /// );
    /// ```
    #[must_use]
    pub fn parse_identity(record: &[u8]) -> Option<ScanIdentity> {
        let (company, rest) = record.split_first_chunk::<2>()?;
        if u16::from_le_bytes(*company) != BUWIZZ_COMPANY_ID {
            return None;
        }
        Self::parse_company_payload(rest)
    }

    /// Parses the record body after the company identifier, as delivered by
    /// platforms that split manufacturer data by company.
    #[must_use]
    pub(crate) fn parse_company_payload(payload: &[u8]) -> Option<ScanIdentity> {
        if payload.len() != MANUFACTURER_RECORD_LEN - 2 || payload[..2] != SIGNATURE {
            return None;
        }

        let mode = if payload[2..4] == BOOTLOADER_MARKER {
            AdvertisedMode::Bootloader
        } else {
            AdvertisedMode::Application {
                firmware: [payload[2], payload[3]],
                serial_low: u16::from_le_bytes([payload[4], payload[5]]),
            }
        };
        Some(ScanIdentity { mode })
    }
}
