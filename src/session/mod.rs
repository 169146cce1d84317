//! Connection lifecycle: a runtime-agnostic state machine plus a tokio driver
//! that runs it against a [`crate::HardwareClient`].

mod driver;
mod machine;

pub use self::driver::{
    DEFAULT_SCAN_TIMEOUT, LinkRequest, QueuedLink, SessionConfig, SessionDriver, SessionHandle,
    SessionSummary,
};
pub use self::machine::{
    SessionConsumer, SessionEnd, SessionError, SessionEvent, SessionState, SessionStateMachine,
    SessionStats, TransportEvent, TransportLink,
};
