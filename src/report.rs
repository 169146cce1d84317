use serde::Serialize;
use serde_with::{hex::Hex, serde_as};

use crate::protocol::CommandCode;

/// Number of motor outputs reported in the status report.
pub const MOTOR_OUTPUTS: usize = 6;

/// Number of PoweredUp auxiliary motor channels.
pub const AUX_MOTOR_CHANNELS: usize = 4;

/// Two-bit battery level reported by the device.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum BatteryLevel {
    /// Battery empty; motors are disabled.
    #[display("empty")]
    Empty,
    #[display("low")]
    Low,
    #[display("medium")]
    Medium,
    #[display("full")]
    Full,
}

impl BatteryLevel {
    /// Maps the two-bit raw value; higher bits are ignored.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw & 0b11 {
            0 => Self::Empty,
            1 => Self::Low,
            2 => Self::Medium,
            _ => Self::Full,
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::Full => 3,
        }
    }
}

/// Flags packed into byte 1 of the status report.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct StatusFlags {
    pub usb_connected: bool,
    pub battery_charging: bool,
    pub battery_level: BatteryLevel,
    pub ble_long_range: bool,
    pub error: bool,
}

/// Accelerometer reading in milligravity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccelerometerSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Per-output motor currents in amperes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotorCurrents([f32; MOTOR_OUTPUTS]);

impl MotorCurrents {
    pub(crate) fn new(amps: [f32; MOTOR_OUTPUTS]) -> Self {
        Self(amps)
    }

    /// Current of output `index` (0-based), if it exists.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Raw bootloader response block, passed through uninterpreted.
#[serde_as]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct BootloaderResponse {
    pub command: u8,
    pub code: u8,
    #[serde_as(as = "Hex")]
    pub data: [u8; 3],
}

/// State of one PoweredUp motor channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct AuxMotorState {
    pub motor_type: u8,
    pub velocity: i8,
    pub absolute_position: u16,
    pub position: u32,
}

/// Optional PID controller block appended to long status reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidControllerState {
    pub process_value: f32,
    pub error: f32,
    pub output: f32,
    pub integrator: i8,
    pub motor_output: i8,
}

/// One decoded device status report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatusReport {
    #[serde(serialize_with = "serialize_code")]
    pub command: CommandCode,
    pub flags: StatusFlags,
    /// Volts.
    pub battery_voltage: f32,
    pub motor_currents: MotorCurrents,
    /// Degrees Celsius.
    pub controller_temperature: i8,
    pub accelerometer: AccelerometerSample,
    pub bootloader_response: BootloaderResponse,
    /// Milliamps.
    pub battery_charge_current: u8,
    pub aux_motors: [AuxMotorState; AUX_MOTOR_CHANNELS],
    pub pid_state: Option<PidControllerState>,
}

fn serialize_code<S>(code: &CommandCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u8(u8::from(*code))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, BatteryLevel::Empty)]
    #[case(1, BatteryLevel::Low)]
    #[case(2, BatteryLevel::Medium)]
    #[case(3, BatteryLevel::Full)]
    #[case(0b111, BatteryLevel::Full)]
    fn battery_level_maps_two_bit_values(#[case] raw: u8, #[case] expected: BatteryLevel) {
        let level = BatteryLevel::from_raw(raw);
        assert_eq!(expected, level);
        assert_eq!(raw & 0b11, level.as_raw());
    }

    #[test]
    fn bootloader_response_serialises_data_as_hex() {
        let response = BootloaderResponse {
            command: 0x10,
            code: 0x00,
            data: [0xAB, 0x01, 0xFF],
        };
        let json = serde_json::to_string(&response).expect("response should serialise");
        assert_eq!(r#"{"command":16,"code":0,"data":"ab01ff"}"#, json);
    }

    #[test]
    fn motor_currents_index_is_bounded() {
        let currents = MotorCurrents::new([0.0, 0.015, 0.03, 0.045, 0.06, 0.075]);
        assert_eq!(Some(0.015), currents.get(1));
        assert_eq!(None, currents.get(MOTOR_OUTPUTS));
    }
}
