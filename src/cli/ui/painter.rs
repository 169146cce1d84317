use owo_colors::{OwoColorize, Style as OwoStyle};

use crate::report::BatteryLevel;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Tone {
    Heading,
    Success,
    Warning,
    Failure,
    Muted,
    Value,
}

impl Tone {
    fn style(self) -> OwoStyle {
        match self {
            Self::Heading => OwoStyle::new().bold().cyan(),
            Self::Success => OwoStyle::new().bold().green(),
            Self::Warning => OwoStyle::new().bold().yellow(),
            Self::Failure => OwoStyle::new().bold().red(),
            Self::Muted => OwoStyle::new().dimmed(),
            Self::Value => OwoStyle::new().bold(),
        }
    }
}

/// Applies colour and style to terminal text.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Heading)
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Success)
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Warning)
    }

    pub(crate) fn failure<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Failure)
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Muted)
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Value)
    }

    /// Colours a battery level by how close the pack is to cutting the motors.
    pub(crate) fn battery(&self, level: BatteryLevel) -> String {
        let tone = match level {
            BatteryLevel::Empty => Tone::Failure,
            BatteryLevel::Low => Tone::Warning,
            BatteryLevel::Medium => Tone::Value,
            BatteryLevel::Full => Tone::Success,
        };
        self.paint(&level.to_string(), tone)
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        if self.use_colour {
            format!("{}", text.style(tone.style()))
        } else {
            text.to_string()
        }
    }
}
