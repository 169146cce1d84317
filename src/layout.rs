//! Byte layouts for the BuWizz 3.0 application protocol.
//!
//! The catalog is plain data: every offset, bit span and scale factor the
//! codec needs lives here so that alternative layouts can be injected in
//! tests without touching decoding logic.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use bon::Builder;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::protocol::{APPLICATION_CHARACTERISTIC_UUID, APPLICATION_SERVICE_UUID, CommandCode};

static BUWIZZ3_CATALOG: LazyLock<Arc<LayoutCatalog>> =
    LazyLock::new(|| Arc::new(LayoutCatalog::buwizz3()));

/// Returns the shared vendor catalog.
#[must_use]
pub fn default_catalog() -> Arc<LayoutCatalog> {
    Arc::clone(&BUWIZZ3_CATALOG)
}

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    pub(crate) fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            Self::Little => LittleEndian::read_u16(bytes),
            Self::Big => BigEndian::read_u16(bytes),
        }
    }

    pub(crate) fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(bytes),
            Self::Big => BigEndian::read_u32(bytes),
        }
    }

    pub(crate) fn read_f32(self, bytes: &[u8]) -> f32 {
        match self {
            Self::Little => LittleEndian::read_f32(bytes),
            Self::Big => BigEndian::read_f32(bytes),
        }
    }
}

/// A contiguous byte range inside a payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ByteSpan {
    pub offset: usize,
    pub len: usize,
}

impl ByteSpan {
    #[must_use]
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Index one past the last byte of the span.
    #[must_use]
    pub const fn end(self) -> usize {
        self.offset + self.len
    }
}

/// A bit range inside a single byte, `shift` counted from bit 0.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BitSpan {
    pub shift: u8,
    pub width: u8,
}

impl BitSpan {
    #[must_use]
    pub const fn bit(shift: u8) -> Self {
        Self { shift, width: 1 }
    }

    #[must_use]
    pub const fn bits(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    /// Extracts this span from `byte`; nothing outside the span is read.
    ///
    /// Bits past the top of the byte read as zero.
    #[must_use]
    pub const fn extract(self, byte: u8) -> u8 {
        let mask = match 1u16.checked_shl(self.width as u32) {
            Some(bit) if bit <= 0x100 => (bit - 1) as u8,
            _ => u8::MAX,
        };
        match byte.checked_shr(self.shift as u32) {
            Some(shifted) => shifted & mask,
            None => 0,
        }
    }
}

/// `physical = base + raw * per_unit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub base: f32,
    pub per_unit: f32,
}

impl LinearScale {
    #[must_use]
    pub const fn new(base: f32, per_unit: f32) -> Self {
        Self { base, per_unit }
    }

    #[must_use]
    pub fn apply(self, raw: f32) -> f32 {
        self.base + raw * self.per_unit
    }
}

/// Bit positions inside the status flags byte.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StatusFlagBits {
    pub usb_connected: BitSpan,
    pub battery_charging: BitSpan,
    pub battery_level: BitSpan,
    pub ble_long_range: BitSpan,
    pub error: BitSpan,
}

/// Left-aligned signed accelerometer axes, one 16-bit slot per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerometerLayout {
    pub offset: usize,
    pub axes: usize,
    pub slot_len: usize,
    pub padding_bits: u8,
    pub value_bits: u8,
    pub milli_g_per_digit: f32,
}

impl AccelerometerLayout {
    #[must_use]
    pub const fn span(&self) -> ByteSpan {
        ByteSpan::new(self.offset, self.axes * self.slot_len)
    }
}

/// Repeated fixed-size blocks laid out back to back.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BlockArray {
    pub offset: usize,
    pub count: usize,
    pub stride: usize,
}

impl BlockArray {
    #[must_use]
    pub const fn span(&self) -> ByteSpan {
        ByteSpan::new(self.offset, self.count * self.stride)
    }

    /// Span of block `index`.
    #[must_use]
    pub const fn block(&self, index: usize) -> ByteSpan {
        ByteSpan::new(self.offset + index * self.stride, self.stride)
    }
}

/// Field layout of the device status report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReportLayout {
    pub report_code: CommandCode,
    pub min_len: usize,
    pub endianness: Endianness,
    pub flags_offset: usize,
    pub flags: StatusFlagBits,
    pub battery_voltage_offset: usize,
    pub battery_voltage: LinearScale,
    pub motor_currents: ByteSpan,
    pub motor_current: LinearScale,
    pub temperature_offset: usize,
    pub accelerometer: AccelerometerLayout,
    pub bootloader_response: ByteSpan,
    pub charge_current_offset: usize,
    pub aux_motors: BlockArray,
    pub pid_state: ByteSpan,
}

impl StatusReportLayout {
    /// Vendor layout from the BuWizz 3.0 API 3.6 document.
    #[must_use]
    pub fn buwizz3() -> Self {
        Self {
            report_code: CommandCode::DeviceStatusReport,
            min_len: 22,
            endianness: Endianness::Little,
            flags_offset: 1,
            flags: StatusFlagBits {
                usb_connected: BitSpan::bit(6),
                battery_charging: BitSpan::bit(5),
                battery_level: BitSpan::bits(3, 2),
                ble_long_range: BitSpan::bit(2),
                error: BitSpan::bit(0),
            },
            battery_voltage_offset: 2,
            battery_voltage: LinearScale::new(9.0, 0.05),
            motor_currents: ByteSpan::new(3, 6),
            motor_current: LinearScale::new(0.0, 0.015),
            temperature_offset: 9,
            accelerometer: AccelerometerLayout {
                offset: 10,
                axes: 3,
                slot_len: 2,
                padding_bits: 4,
                value_bits: 12,
                milli_g_per_digit: 0.488,
            },
            bootloader_response: ByteSpan::new(16, 5),
            charge_current_offset: 21,
            aux_motors: BlockArray {
                offset: 22,
                count: 4,
                stride: 8,
            },
            pid_state: ByteSpan::new(54, 14),
        }
    }
}

/// Placement of a command's payload inside its frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CommandLayout {
    pub payload: ByteSpan,
    pub padding: u8,
}

impl CommandLayout {
    #[must_use]
    pub const fn new(payload_offset: usize, payload_len: usize) -> Self {
        Self {
            payload: ByteSpan::new(payload_offset, payload_len),
            padding: 0x00,
        }
    }

    /// Total frame length including the command byte.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.payload.end()
    }
}

/// Immutable catalog of every payload shape the codec understands.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct LayoutCatalog {
    #[builder(default = StatusReportLayout::buwizz3())]
    status_report: StatusReportLayout,
    #[builder(default)]
    commands: HashMap<CommandCode, CommandLayout>,
    #[builder(default = APPLICATION_SERVICE_UUID)]
    service_uuid: uuid::Uuid,
    #[builder(default = APPLICATION_CHARACTERISTIC_UUID)]
    telemetry_characteristic: uuid::Uuid,
}

impl LayoutCatalog {
    /// Vendor catalog for BuWizz 3.0 firmware.
    #[must_use]
    pub fn buwizz3() -> Self {
        Self::builder()
            .commands(HashMap::from([
                (CommandCode::SetDeviceName, CommandLayout::new(1, 12)),
                (CommandCode::SetLedStatus, CommandLayout::new(1, 12)),
            ]))
            .build()
    }

    #[must_use]
    pub fn status_report(&self) -> &StatusReportLayout {
        &self.status_report
    }

    /// Looks up the encode layout for an outbound command.
    #[must_use]
    pub fn command_layout(&self, code: CommandCode) -> Option<&CommandLayout> {
        self.commands.get(&code)
    }

    /// Service UUID identifying a BuWizz in advertisements.
    #[must_use]
    pub fn service_uuid(&self) -> uuid::Uuid {
        self.service_uuid
    }

    /// Characteristic that carries status report notifications.
    #[must_use]
    pub fn telemetry_characteristic(&self) -> uuid::Uuid {
        self.telemetry_characteristic
    }
}

impl Default for LayoutCatalog {
    fn default() -> Self {
        Self::buwizz3()
    }
}
