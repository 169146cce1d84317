use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::ProtocolError;
use crate::session::SessionHandle;

use super::OutboundCommand;

/// Number of RGB status LEDs on a BuWizz 3.0.
pub const LED_COUNT: usize = 4;

/// Errors returned when parsing a colour.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum LedColourError {
    #[error("colour `{value}` must be six hexadecimal digits (RRGGBB)")]
    InvalidFormat { value: String },
}

/// RGB colour value.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Creates an RGB colour.
    ///
    /// ```
    /// use buwizz::Rgb;
    ///
    /// let colour = Rgb::new(255, 127, 0);
    /// assert_eq!(255, colour.r);
    /// ```
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Rgb {
    type Err = LedColourError;

    /// Parses `RRGGBB`, with or without a leading `#`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        let mut bytes = [0u8; 3];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| LedColourError::InvalidFormat {
            value: value.to_string(),
        })?;
        let [r, g, b] = bytes;
        Ok(Self { r, g, b })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", hex::encode_upper([self.r, self.g, self.b]))
    }
}

/// Colours for every status LED, in LED order.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LedStatus([Rgb; LED_COUNT]);

impl LedStatus {
    #[must_use]
    pub const fn new(colours: [Rgb; LED_COUNT]) -> Self {
        Self(colours)
    }

    /// Sets every LED to the same colour.
    #[must_use]
    pub const fn uniform(colour: Rgb) -> Self {
        Self([colour; LED_COUNT])
    }

    #[must_use]
    pub fn colours(&self) -> &[Rgb; LED_COUNT] {
        &self.0
    }

    pub(crate) fn to_bytes(self) -> [u8; LED_COUNT * 3] {
        let mut bytes = [0u8; LED_COUNT * 3];
        for (chunk, colour) in bytes.chunks_exact_mut(3).zip(self.0) {
            chunk.copy_from_slice(&[colour.r, colour.g, colour.b]);
        }
        bytes
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != LED_COUNT * 3 {
            return None;
        }
        let mut colours = [Rgb::default(); LED_COUNT];
        for (colour, chunk) in colours.iter_mut().zip(bytes.chunks_exact(3)) {
            *colour = Rgb::new(chunk[0], chunk[1], chunk[2]);
        }
        Some(Self(colours))
    }
}

/// Handler for the set-LED-status command.
pub struct LedStatusHandler;

impl LedStatusHandler {
    /// Sets the status LED colours.
    ///
    /// ```
    /// # async fn demo(session: &buwizz::SessionHandle) -> Result<(), buwizz::ProtocolError> {
    /// use buwizz::{LedStatus, LedStatusHandler, Rgb};
    ///
    /// LedStatusHandler::set_leds(session, LedStatus::uniform(Rgb::new(0, 255, 0))).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the session is not subscribed or encoding fails.
    pub async fn set_leds(session: &SessionHandle, status: LedStatus) -> Result<(), ProtocolError> {
        session.send(OutboundCommand::SetLedStatus(status)).await?;
        Ok(())
    }
}
