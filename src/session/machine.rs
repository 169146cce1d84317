use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::error::InteractionError;
use crate::handlers::{CommandCodec, EncodeError, OutboundCommand};
use crate::hw::FoundDevice;
use crate::layout::LayoutCatalog;
use crate::matcher::DeviceMatcher;
use crate::notification::{DecodeError, RawPayload, StatusReportDecoder};
use crate::report::DeviceStatusReport;
use crate::utils::format_hex;

/// Lifecycle of one logical connection.
///
/// `Disconnected` is terminal; a new session needs a new state machine.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Default, strum_macros::Display, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Subscribed,
    Disconnected,
}

/// Errors returned to callers of the session API.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SessionError {
    /// The operation is not valid in the current state.
    #[error("session is not ready: currently {state}")]
    NotReady { state: SessionState },
    /// The command could not be encoded; nothing was written.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The transport rejected the request.
    #[error("transport failure: {cause}")]
    TransportFailure { cause: String },
}

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    DeviceDiscovered(FoundDevice),
    DiscoveryTimedOut,
    Connected,
    ConnectFailed { cause: String },
    /// Enabling notifications on the telemetry characteristic failed.
    SubscribeFailed { cause: String },
    Notification(RawPayload),
    Disconnected { cause: Option<String> },
}

/// Why a session ended.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Display, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SessionEnd {
    #[display("no matching device was found before the scan timed out")]
    NoDeviceFound,
    #[display("connecting failed: {cause}")]
    ConnectFailed { cause: String },
    #[display("transport failure: {cause}")]
    TransportFailure { cause: String },
    #[display("device disconnected{}", cause.as_ref().map(|cause| format!(": {cause}")).unwrap_or_default())]
    Disconnected { cause: Option<String> },
    #[display("stopped by the consumer")]
    Stopped,
}

/// What the state machine surfaces to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// One decoded payload, or the reason it could not be decoded.
    Telemetry(Result<DeviceStatusReport, DecodeError>),
    /// A write accepted by the session later failed in the transport.
    WriteFailed { cause: String },
    /// Emitted exactly once when the session reaches `Disconnected`.
    Ended(SessionEnd),
}

/// Receives session events.
pub trait SessionConsumer: Send {
    fn on_event(&mut self, event: SessionEvent);
}

impl<F> SessionConsumer for F
where
    F: FnMut(SessionEvent) + Send,
{
    fn on_event(&mut self, event: SessionEvent) {
        self(event);
    }
}

/// Non-blocking transport requests issued by the state machine.
///
/// Implementations only start the work; its result arrives later as a
/// [`TransportEvent`].
pub trait TransportLink {
    fn start_discovery(&mut self, matcher: DeviceMatcher) -> Result<(), InteractionError>;
    fn connect(&mut self, device: &FoundDevice) -> Result<(), InteractionError>;
    fn subscribe(&mut self, characteristic: Uuid) -> Result<(), InteractionError>;
    fn write(&mut self, characteristic: Uuid, frame: Vec<u8>) -> Result<(), InteractionError>;
    fn disconnect(&mut self);
}

/// Per-session telemetry counters.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize)]
pub struct SessionStats {
    pub reports: usize,
    pub decode_errors: usize,
    pub ignored_payloads: usize,
}

/// Owns the lifecycle of one logical connection.
///
/// Not safe for concurrent use; one control-plane owner drives it.
pub struct SessionStateMachine<L> {
    link: L,
    catalog: Arc<LayoutCatalog>,
    matcher: DeviceMatcher,
    state: SessionState,
    consumer: Option<Box<dyn SessionConsumer>>,
    device: Option<FoundDevice>,
    stats: SessionStats,
    end: Option<SessionEnd>,
}

impl<L: TransportLink> SessionStateMachine<L> {
    /// Creates an idle session matching on the catalog's service UUID.
    #[must_use]
    pub fn new(link: L, catalog: Arc<LayoutCatalog>) -> Self {
        Self {
            link,
            matcher: DeviceMatcher::for_catalog(&catalog),
            catalog,
            state: SessionState::Idle,
            consumer: None,
            device: None,
            stats: SessionStats::default(),
            end: None,
        }
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: DeviceMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the device selected during discovery.
    #[must_use]
    pub fn device(&self) -> Option<&FoundDevice> {
        self.device.as_ref()
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Returns why the session ended, once it has.
    #[must_use]
    pub fn end(&self) -> Option<&SessionEnd> {
        self.end.as_ref()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Registers `consumer` and begins scanning.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] unless the session is idle and
    /// [`SessionError::TransportFailure`] when discovery cannot start.
    pub fn start(
        &mut self,
        consumer: impl SessionConsumer + 'static,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::NotReady { state: self.state });
        }

        self.consumer = Some(Box::new(consumer));
        self.transition(SessionState::Scanning);
        if let Err(error) = self.link.start_discovery(self.matcher) {
            let cause = error.to_string();
            self.finish(SessionEnd::TransportFailure {
                cause: cause.clone(),
            });
            return Err(SessionError::TransportFailure { cause });
        }
        Ok(())
    }

    /// Applies one transport event.
    #[instrument(skip_all, level = "trace", fields(state = %self.state))]
    pub fn handle_event(&mut self, event: TransportEvent) {
        match (self.state, event) {
            (SessionState::Scanning, TransportEvent::DeviceDiscovered(device)) => {
                if !self.matcher.matches(device.advertised_services()) {
                    trace!(device_id = device.device_id(), "ignoring non-matching device");
                    return;
                }
                info!(device_id = device.device_id(), "selected device");
                self.transition(SessionState::Connecting);
                let result = self.link.connect(&device);
                self.device = Some(device);
                if let Err(error) = result {
                    self.fail(SessionEnd::ConnectFailed {
                        cause: error.to_string(),
                    });
                }
            }
            (SessionState::Scanning, TransportEvent::DiscoveryTimedOut) => {
                self.finish(SessionEnd::NoDeviceFound);
            }
            (SessionState::Connecting, TransportEvent::Connected) => {
                match self.link.subscribe(self.catalog.telemetry_characteristic()) {
                    Ok(()) => self.transition(SessionState::Subscribed),
                    Err(error) => self.fail(SessionEnd::TransportFailure {
                        cause: error.to_string(),
                    }),
                }
            }
            (SessionState::Connecting, TransportEvent::ConnectFailed { cause }) => {
                self.finish(SessionEnd::ConnectFailed { cause });
            }
            (SessionState::Subscribed, TransportEvent::SubscribeFailed { cause }) => {
                self.fail(SessionEnd::TransportFailure { cause });
            }
            (SessionState::Subscribed, TransportEvent::Notification(payload)) => {
                self.deliver(&payload);
            }
            (SessionState::Disconnected, TransportEvent::Notification(_)) => {
                trace!("discarding payload received after disconnect");
            }
            (SessionState::Disconnected, _) => {}
            (_, TransportEvent::Disconnected { cause }) => {
                self.finish(SessionEnd::Disconnected { cause });
            }
            (state, event) => {
                warn!(%state, ?event, "ignoring transport event not valid in this state");
            }
        }
    }

    /// Encodes `command` and hands the frame to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] outside `Subscribed`,
    /// [`SessionError::Encode`] without writing anything when encoding fails,
    /// and [`SessionError::TransportFailure`] when the link rejects the write.
    #[instrument(skip(self), level = "debug", fields(state = %self.state, code = %command.code()))]
    pub fn send(&mut self, command: &OutboundCommand) -> Result<(), SessionError> {
        if self.state != SessionState::Subscribed {
            return Err(SessionError::NotReady { state: self.state });
        }

        let frame = CommandCodec::encode(&self.catalog, command)?;
        self.link
            .write(self.catalog.telemetry_characteristic(), frame)
            .map_err(|error| SessionError::TransportFailure {
                cause: error.to_string(),
            })
    }

    /// Surfaces a write that failed after [`Self::send`] accepted it.
    pub fn report_write_failure(&mut self, cause: String) {
        if self.state == SessionState::Subscribed {
            warn!(%cause, "write failed");
            self.emit(SessionEvent::WriteFailed { cause });
        }
    }

    /// Ends the session immediately. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.link.disconnect();
        self.finish(SessionEnd::Stopped);
    }

    fn deliver(&mut self, payload: &RawPayload) {
        if payload.characteristic() != self.catalog.telemetry_characteristic() {
            self.stats.ignored_payloads += 1;
            trace!(characteristic = %payload.characteristic(), "ignoring payload from another characteristic");
            return;
        }

        let result = StatusReportDecoder::new(&self.catalog).decode(payload.bytes());
        match &result {
            Ok(_) => self.stats.reports += 1,
            Err(error) => {
                self.stats.decode_errors += 1;
                debug!(%error, payload = %format_hex(payload.bytes()), "failed to decode payload");
            }
        }
        self.emit(SessionEvent::Telemetry(result));
    }

    /// Tears down the link before ending, for failures after discovery.
    fn fail(&mut self, end: SessionEnd) {
        self.link.disconnect();
        self.finish(end);
    }

    fn finish(&mut self, end: SessionEnd) {
        if self.end.is_some() {
            return;
        }
        self.transition(SessionState::Disconnected);
        info!(%end, "session ended");
        self.end = Some(end.clone());
        self.emit(SessionEvent::Ended(end));
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session state transition");
        self.state = next;
    }

    fn emit(&mut self, event: SessionEvent) {
        if let Some(consumer) = self.consumer.as_mut() {
            consumer.on_event(event);
        }
    }
}
