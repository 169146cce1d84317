use thiserror::Error;
use tracing::instrument;

use crate::layout::LayoutCatalog;
use crate::notification::DecodeError;
use crate::protocol::CommandCode;

use super::{DeviceName, LedStatus};

/// Errors returned while encoding an outbound command.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EncodeError {
    /// The catalog has no layout for this command code.
    #[error("no command layout is registered for {0}")]
    UnknownCommand(CommandCode),
    /// The payload does not fit the layout's declared length.
    #[error("payload for {code} is {len} bytes but the layout allows at most {max}")]
    PayloadTooLong {
        code: CommandCode,
        len: usize,
        max: usize,
    },
}

/// A command the host can write to the application characteristic.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OutboundCommand {
    /// Rename the device (`0x20`).
    SetDeviceName(DeviceName),
    /// Set the status LED colours (`0x36`).
    SetLedStatus(LedStatus),
    /// Any other catalogued command with a pre-serialised payload.
    Raw { code: CommandCode, payload: Vec<u8> },
}

impl OutboundCommand {
    /// Returns the command byte this command is sent with.
    #[must_use]
    pub fn code(&self) -> CommandCode {
        match self {
            Self::SetDeviceName(_) => CommandCode::SetDeviceName,
            Self::SetLedStatus(_) => CommandCode::SetLedStatus,
            Self::Raw { code, .. } => *code,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Self::SetDeviceName(name) => name.as_bytes().to_vec(),
            Self::SetLedStatus(status) => status.to_bytes().to_vec(),
            Self::Raw { payload, .. } => payload.clone(),
        }
    }
}

/// Encodes and parses application command frames.
pub struct CommandCodec;

impl CommandCodec {
    /// Serialises `command` into the exact bytes to write.
    ///
    /// ```
    /// use buwizz::{CommandCodec, DeviceName, LayoutCatalog, OutboundCommand};
    ///
    /// let catalog = LayoutCatalog::buwizz3();
    /// let name = DeviceName::new("Crane")?;
    /// let frame = CommandCodec::encode(&catalog, &OutboundCommand::SetDeviceName(name))?;
    /// assert_eq!(&[0x20, b'C', b'r', b'a', b'n', b'e', 0, 0, 0, 0, 0, 0, 0], frame.as_slice());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnknownCommand`] when the catalog has no layout
    /// for the command and [`EncodeError::PayloadTooLong`] when the payload
    /// does not fit it.
    #[instrument(skip(catalog, command), level = "trace", fields(code = %command.code()))]
    pub fn encode(
        catalog: &LayoutCatalog,
        command: &OutboundCommand,
    ) -> Result<Vec<u8>, EncodeError> {
        let code = command.code();
        let layout = catalog
            .command_layout(code)
            .ok_or(EncodeError::UnknownCommand(code))?;
        let payload = command.payload();
        if payload.len() > layout.payload.len {
            return Err(EncodeError::PayloadTooLong {
                code,
                len: payload.len(),
                max: layout.payload.len,
            });
        }

        let mut frame = vec![layout.padding; layout.frame_len()];
        frame[0] = u8::from(code);
        let start = layout.payload.offset;
        frame[start..start + payload.len()].copy_from_slice(&payload);
        Ok(frame)
    }

    /// Parses a command frame back into a typed command.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnsupportedReport`] for codes without a layout,
    /// [`DecodeError::Truncated`] for short frames and
    /// [`DecodeError::InvalidField`] when a typed payload fails validation.
    pub fn decode(catalog: &LayoutCatalog, bytes: &[u8]) -> Result<OutboundCommand, DecodeError> {
        let Some(&raw_code) = bytes.first() else {
            return Err(DecodeError::Truncated {
                expected: 1,
                actual: 0,
            });
        };
        let code = CommandCode::from(raw_code);
        let layout = catalog
            .command_layout(code)
            .ok_or(DecodeError::UnsupportedReport(code))?;
        let payload = bytes
            .get(layout.payload.offset..layout.payload.end())
            .ok_or(DecodeError::Truncated {
                expected: layout.frame_len(),
                actual: bytes.len(),
            })?;

        match code {
            CommandCode::SetDeviceName => {
                let trimmed_len = payload
                    .iter()
                    .rposition(|byte| *byte != layout.padding)
                    .map_or(0, |index| index + 1);
                DeviceName::from_bytes(&payload[..trimmed_len])
                    .map(OutboundCommand::SetDeviceName)
                    .map_err(|error| DecodeError::InvalidField {
                        field: "device_name",
                        reason: error.to_string(),
                    })
            }
            CommandCode::SetLedStatus => LedStatus::from_bytes(payload)
                .map(OutboundCommand::SetLedStatus)
                .ok_or_else(|| DecodeError::InvalidField {
                    field: "led_status",
                    reason: format!("expected 12 colour bytes, got {}", payload.len()),
                }),
            _ => Ok(OutboundCommand::Raw {
                code,
                payload: payload.to_vec(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::handlers::Rgb;
    use crate::layout::CommandLayout;

    fn catalog() -> LayoutCatalog {
        LayoutCatalog::buwizz3()
    }

    #[test]
    fn encode_led_status_lays_out_four_rgb_triplets() {
        let status = LedStatus::new([
            Rgb::new(0x11, 0x12, 0x13),
            Rgb::new(0x21, 0x22, 0x23),
            Rgb::new(0x31, 0x32, 0x33),
            Rgb::new(0x41, 0x42, 0x43),
        ]);
        let frame = CommandCodec::encode(&catalog(), &OutboundCommand::SetLedStatus(status))
            .expect("LED frame should encode");
        assert_eq!(
            vec![
                0x36, 0x11, 0x12, 0x13, 0x21, 0x22, 0x23, 0x31, 0x32, 0x33, 0x41, 0x42, 0x43
            ],
            frame
        );
    }

    #[rstest]
    #[case::name(OutboundCommand::SetDeviceName(
        DeviceName::new("Excavator").expect("test name should be valid")
    ))]
    #[case::full_length_name(OutboundCommand::SetDeviceName(
        DeviceName::new("BuWizz-Crane").expect("test name should be valid")
    ))]
    #[case::leds(OutboundCommand::SetLedStatus(LedStatus::uniform(Rgb::new(0, 128, 255))))]
    fn encode_then_decode_reproduces_command(#[case] command: OutboundCommand) {
        let frame = CommandCodec::encode(&catalog(), &command).expect("command should encode");
        let decoded = CommandCodec::decode(&catalog(), &frame).expect("frame should decode");
        assert_eq!(command, decoded);
    }

    #[test]
    fn encode_rejects_commands_missing_from_catalog() {
        let command = OutboundCommand::Raw {
            code: CommandCode::Unknown(0x30),
            payload: vec![0x7F],
        };
        assert_matches!(
            CommandCodec::encode(&catalog(), &command),
            Err(EncodeError::UnknownCommand(CommandCode::Unknown(0x30)))
        );
    }

    #[test]
    fn encode_uses_injected_layouts() {
        let catalog = LayoutCatalog::builder()
            .commands(HashMap::from([(
                CommandCode::Unknown(0x30),
                CommandLayout::new(1, 4),
            )]))
            .build();
        let command = OutboundCommand::Raw {
            code: CommandCode::Unknown(0x30),
            payload: vec![0x7F, 0x81],
        };

        let frame = CommandCodec::encode(&catalog, &command).expect("raw frame should encode");
        assert_eq!(vec![0x30, 0x7F, 0x81, 0x00, 0x00], frame);
        assert_matches!(
            CommandCodec::encode(
                &catalog,
                &OutboundCommand::SetLedStatus(LedStatus::uniform(Rgb::new(1, 2, 3)))
            ),
            Err(EncodeError::UnknownCommand(CommandCode::SetLedStatus))
        );
    }

    #[test]
    fn encode_rejects_oversized_raw_payload() {
        let command = OutboundCommand::Raw {
            code: CommandCode::SetLedStatus,
            payload: vec![0; 13],
        };
        assert_matches!(
            CommandCodec::encode(&catalog(), &command),
            Err(EncodeError::PayloadTooLong {
                len: 13,
                max: 12,
                ..
            })
        );
    }

    #[rstest]
    #[case(&[], DecodeError::Truncated { expected: 1, actual: 0 })]
    #[case(&[0x36, 0x01], DecodeError::Truncated { expected: 13, actual: 2 })]
    #[case(&[0x99, 0x01], DecodeError::UnsupportedReport(CommandCode::Unknown(0x99)))]
    fn decode_reports_malformed_frames(#[case] frame: &[u8], #[case] expected: DecodeError) {
        assert_eq!(Err(expected), CommandCodec::decode(&catalog(), frame));
    }

    #[test]
    fn decode_rejects_non_ascii_names() {
        let mut frame = vec![0x20, 0xC3, 0xA9];
        frame.resize(13, 0);
        assert_matches!(
            CommandCodec::decode(&catalog(), &frame),
            Err(DecodeError::InvalidField {
                field: "device_name",
                ..
            })
        );
    }
}
