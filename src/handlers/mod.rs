mod command_codec;
mod device_name;
mod led_status;

pub use self::command_codec::{CommandCodec, EncodeError, OutboundCommand};
pub use self::device_name::{DeviceName, DeviceNameError, DeviceNameHandler};
pub use self::led_status::{LED_COUNT, LedColourError, LedStatus, LedStatusHandler, Rgb};
