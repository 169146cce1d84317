pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod inspect;
pub(crate) mod listen;
pub(crate) mod ui;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::control::{ControlAction, ControlArgs, LedsArgs, SetNameArgs};
pub use self::inspect::InspectArgs;
pub use self::listen::ListenArgs;
