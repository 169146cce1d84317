use thiserror::Error;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::layout::{ByteSpan, LayoutCatalog, StatusReportLayout, default_catalog};
use crate::protocol::CommandCode;
use crate::report::{
    AUX_MOTOR_CHANNELS, AccelerometerSample, AuxMotorState, BatteryLevel, BootloaderResponse,
    DeviceStatusReport, MOTOR_OUTPUTS, MotorCurrents, PidControllerState, StatusFlags,
};

/// One notification as delivered by the transport.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawPayload {
    characteristic: Uuid,
    received_at: OffsetDateTime,
    bytes: Vec<u8>,
}

impl RawPayload {
    #[must_use]
    pub fn new(characteristic: Uuid, received_at: OffsetDateTime, bytes: Vec<u8>) -> Self {
        Self {
            characteristic,
            received_at,
            bytes,
        }
    }

    /// Stamps `bytes` with the current UTC time.
    #[must_use]
    pub fn received_now(characteristic: Uuid, bytes: Vec<u8>) -> Self {
        Self::new(characteristic, OffsetDateTime::now_utc(), bytes)
    }

    #[must_use]
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    #[must_use]
    pub fn received_at(&self) -> OffsetDateTime {
        self.received_at
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Errors returned while decoding a payload.
///
/// These are per-payload; a session keeps running after any of them.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DecodeError {
    /// Byte 0 names a report or command this decoder does not handle.
    #[error("unsupported report code {0}")]
    UnsupportedReport(CommandCode),
    /// The payload ends before a declared field.
    #[error("payload is truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// A field holds a value its type cannot represent.
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Decodes a device status report using the vendor layout.
///
/// ```
/// let mut payload = [0u8; 54];
/// payload[0] = 0x01;
/// payload[2] = 0x7F;
/// let report = buwizz::decode(&payload)?;
/// assert!((report.battery_voltage - 15.35).abs() < 1e-4);
/// # Ok::<(), buwizz::DecodeError>(())
/// ```
///
/// # Errors
///
/// Returns [`DecodeError::UnsupportedReport`] when byte 0 is not the status
/// report code and [`DecodeError::Truncated`] when a declared field lies past
/// the end of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<DeviceStatusReport, DecodeError> {
    StatusReportDecoder::new(&default_catalog()).decode(bytes)
}

/// Decodes device status reports against one catalog layout.
#[derive(Debug, Clone, Copy)]
pub struct StatusReportDecoder<'a> {
    layout: &'a StatusReportLayout,
}

impl<'a> StatusReportDecoder<'a> {
    #[must_use]
    pub fn new(catalog: &'a LayoutCatalog) -> Self {
        Self {
            layout: catalog.status_report(),
        }
    }

    /// Decodes one status report payload.
    ///
    /// # Errors
    ///
    /// See [`decode`].
    #[instrument(skip(self, bytes), level = "trace", fields(payload_len = bytes.len()))]
    pub fn decode(&self, bytes: &[u8]) -> Result<DeviceStatusReport, DecodeError> {
        let layout = self.layout;
        let Some(&code) = bytes.first() else {
            return Err(truncated(layout.min_len, bytes));
        };
        let command = CommandCode::from(code);
        if command != layout.report_code {
            return Err(DecodeError::UnsupportedReport(command));
        }
        if bytes.len() < layout.min_len {
            return Err(truncated(layout.min_len, bytes));
        }

        let flags = self.status_flags(byte_at(bytes, layout.flags_offset)?);
        let battery_voltage = layout
            .battery_voltage
            .apply(f32::from(byte_at(bytes, layout.battery_voltage_offset)?));
        let motor_currents = self.motor_currents(slice(bytes, layout.motor_currents)?)?;
        let controller_temperature = byte_at(bytes, layout.temperature_offset)?.cast_signed();
        let accelerometer = self.accelerometer(slice(bytes, layout.accelerometer.span())?)?;
        let bootloader_response = bootloader_response(slice(bytes, layout.bootloader_response)?)?;
        let battery_charge_current = byte_at(bytes, layout.charge_current_offset)?;
        let aux_motors = self.aux_motors(bytes)?;
        let pid_state = self.pid_state(bytes);

        Ok(DeviceStatusReport {
            command,
            flags,
            battery_voltage,
            motor_currents,
            controller_temperature,
            accelerometer,
            bootloader_response,
            battery_charge_current,
            aux_motors,
            pid_state,
        })
    }

    fn status_flags(&self, byte: u8) -> StatusFlags {
        let bits = self.layout.flags;
        StatusFlags {
            usb_connected: bits.usb_connected.extract(byte) == 1,
            battery_charging: bits.battery_charging.extract(byte) == 1,
            battery_level: BatteryLevel::from_raw(bits.battery_level.extract(byte)),
            ble_long_range: bits.ble_long_range.extract(byte) == 1,
            error: bits.error.extract(byte) == 1,
        }
    }

    fn motor_currents(&self, raw: &[u8]) -> Result<MotorCurrents, DecodeError> {
        let raw: [u8; MOTOR_OUTPUTS] = fixed(raw, "motor_currents")?;
        let scale = self.layout.motor_current;
        Ok(MotorCurrents::new(
            raw.map(|value| scale.apply(f32::from(value))),
        ))
    }

    fn accelerometer(&self, raw: &[u8]) -> Result<AccelerometerSample, DecodeError> {
        let layout = self.layout.accelerometer;
        if layout.axes != 3 || layout.slot_len < 2 {
            return Err(DecodeError::InvalidField {
                field: "accelerometer",
                reason: format!(
                    "layout declares {} axes of {} bytes, expected 3 axes of at least 2",
                    layout.axes, layout.slot_len
                ),
            });
        }
        let used_bits = u16::from(layout.padding_bits) + u16::from(layout.value_bits);
        if !(1..=16).contains(&layout.value_bits) || used_bits > 16 {
            return Err(DecodeError::InvalidField {
                field: "accelerometer",
                reason: format!(
                    "layout declares {} padding and {} value bits, expected 1 to 16 value bits within a 16-bit word",
                    layout.padding_bits, layout.value_bits
                ),
            });
        }
        let axis = |index: usize| {
            let start = index * layout.slot_len;
            let word = self.layout.endianness.read_u16(&raw[start..start + 2]);
            let digits = sign_extend(word >> layout.padding_bits, layout.value_bits);
            f32::from(digits) * layout.milli_g_per_digit
        };

        Ok(AccelerometerSample {
            x: axis(0),
            y: axis(1),
            z: axis(2),
        })
    }

    fn aux_motors(&self, bytes: &[u8]) -> Result<[AuxMotorState; AUX_MOTOR_CHANNELS], DecodeError> {
        let blocks = self.layout.aux_motors;
        let all = slice(bytes, blocks.span())?;
        let endianness = self.layout.endianness;
        let mut motors = [AuxMotorState {
            motor_type: 0,
            velocity: 0,
            absolute_position: 0,
            position: 0,
        }; AUX_MOTOR_CHANNELS];

        for (index, block) in all
            .chunks_exact(blocks.stride)
            .take(AUX_MOTOR_CHANNELS)
            .enumerate()
        {
            let block: [u8; 8] = fixed(block, "aux_motor")?;
            motors[index] = AuxMotorState {
                motor_type: block[0],
                velocity: block[1].cast_signed(),
                absolute_position: endianness.read_u16(&block[2..4]),
                position: endianness.read_u32(&block[4..8]),
            };
        }

        Ok(motors)
    }

    fn pid_state(&self, bytes: &[u8]) -> Option<PidControllerState> {
        let raw = slice(bytes, self.layout.pid_state).ok()?;
        let raw: [u8; 14] = raw.try_into().ok()?;
        let endianness = self.layout.endianness;
        Some(PidControllerState {
            process_value: endianness.read_f32(&raw[0..4]),
            error: endianness.read_f32(&raw[4..8]),
            output: endianness.read_f32(&raw[8..12]),
            integrator: raw[12].cast_signed(),
            motor_output: raw[13].cast_signed(),
        })
    }
}

fn bootloader_response(raw: &[u8]) -> Result<BootloaderResponse, DecodeError> {
    let [command, code, data @ ..]: [u8; 5] = fixed(raw, "bootloader_response")?;
    Ok(BootloaderResponse {
        command,
        code,
        data,
    })
}

/// Sign-extends the low `bits` of `value`; bit `bits - 1` is the sign bit.
pub(crate) fn sign_extend(value: u16, bits: u8) -> i16 {
    let unused = 16 - u32::from(bits);
    (value << unused).cast_signed() >> unused
}

fn truncated(expected: usize, bytes: &[u8]) -> DecodeError {
    DecodeError::Truncated {
        expected,
        actual: bytes.len(),
    }
}

fn byte_at(bytes: &[u8], offset: usize) -> Result<u8, DecodeError> {
    bytes
        .get(offset)
        .copied()
        .ok_or_else(|| truncated(offset + 1, bytes))
}

fn slice(bytes: &[u8], span: ByteSpan) -> Result<&[u8], DecodeError> {
    bytes
        .get(span.offset..span.end())
        .ok_or_else(|| truncated(span.end(), bytes))
}

fn fixed<const N: usize>(raw: &[u8], field: &'static str) -> Result<[u8; N], DecodeError> {
    raw.try_into().map_err(|_| DecodeError::InvalidField {
        field,
        reason: format!("layout span is {} bytes, expected {N}", raw.len()),
    })
}
