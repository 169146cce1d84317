use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use super::machine::{
    SessionConsumer, SessionEnd, SessionError, SessionState, SessionStateMachine, SessionStats,
    TransportEvent, TransportLink,
};
use crate::error::InteractionError;
use crate::handlers::OutboundCommand;
use crate::hw::{ConnectedPeripheral, FoundDevice, HardwareClient, NotificationStream, WriteMode};
use crate::layout::{LayoutCatalog, default_catalog};
use crate::matcher::DeviceMatcher;
use crate::notification::RawPayload;

/// Default time a session scans before giving up.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

const REQUEST_QUEUE_DEPTH: usize = 16;

/// Settings for one driven session.
#[derive(Debug, Clone, Builder)]
pub struct SessionConfig {
    #[builder(default = DEFAULT_SCAN_TIMEOUT)]
    scan_timeout: Duration,
    #[builder(default = default_catalog())]
    catalog: Arc<LayoutCatalog>,
    /// Overrides the catalog's identifying service.
    matcher: Option<DeviceMatcher>,
    #[builder(default)]
    write_mode: WriteMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionConfig {
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<LayoutCatalog> {
        &self.catalog
    }
}

/// Transport work requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkRequest {
    StartDiscovery(DeviceMatcher),
    Connect(FoundDevice),
    Subscribe(Uuid),
    Write { characteristic: Uuid, frame: Vec<u8> },
    Disconnect,
}

/// [`TransportLink`] that queues requests for an async owner to perform.
#[derive(Debug, Default)]
pub struct QueuedLink {
    requests: VecDeque<LinkRequest>,
}

impl QueuedLink {
    /// Takes the oldest queued request.
    pub fn pop(&mut self) -> Option<LinkRequest> {
        self.requests.pop_front()
    }
}

impl TransportLink for QueuedLink {
    fn start_discovery(&mut self, matcher: DeviceMatcher) -> Result<(), InteractionError> {
        self.requests.push_back(LinkRequest::StartDiscovery(matcher));
        Ok(())
    }

    fn connect(&mut self, device: &FoundDevice) -> Result<(), InteractionError> {
        self.requests.push_back(LinkRequest::Connect(device.clone()));
        Ok(())
    }

    fn subscribe(&mut self, characteristic: Uuid) -> Result<(), InteractionError> {
        self.requests.push_back(LinkRequest::Subscribe(characteristic));
        Ok(())
    }

    fn write(&mut self, characteristic: Uuid, frame: Vec<u8>) -> Result<(), InteractionError> {
        self.requests.push_back(LinkRequest::Write {
            characteristic,
            frame,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        self.requests.push_back(LinkRequest::Disconnect);
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    device: Option<FoundDevice>,
    stats: SessionStats,
    end: SessionEnd,
}

impl SessionSummary {
    /// Returns the device the session selected, if discovery succeeded.
    #[must_use]
    pub fn device(&self) -> Option<&FoundDevice> {
        self.device.as_ref()
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    #[must_use]
    pub fn end(&self) -> &SessionEnd {
        &self.end
    }
}

/// What a handle can observe of a running session.
#[derive(Debug, Clone, Default)]
struct SessionSnapshot {
    state: SessionState,
    device: Option<FoundDevice>,
}

#[derive(Debug)]
enum DriverRequest {
    Send {
        command: OutboundCommand,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Control handle for a session running on a driver task.
///
/// Dropping every handle stops the session.
#[derive(Debug)]
pub struct SessionHandle {
    requests: mpsc::Sender<DriverRequest>,
    snapshot: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    /// Sends `command` and waits for the transport to accept it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] unless the session is subscribed,
    /// [`SessionError::Encode`] when the command cannot be encoded and
    /// [`SessionError::TransportFailure`] when the write fails.
    pub async fn send(&self, command: OutboundCommand) -> Result<(), SessionError> {
        let closed = || SessionError::NotReady {
            state: SessionState::Disconnected,
        };
        let (reply, response) = oneshot::channel();
        self.requests
            .send(DriverRequest::Send { command, reply })
            .await
            .map_err(|_| closed())?;
        response.await.map_err(|_| closed())?
    }

    /// Requests the session to end. Calling it again is a no-op.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    /// Returns the device selected by discovery, once there is one.
    #[must_use]
    pub fn device(&self) -> Option<FoundDevice> {
        self.snapshot.borrow().device.clone()
    }

    /// Waits until the session reaches `target` or ends, returning the state
    /// it settled in.
    pub async fn wait_for_state(&self, target: SessionState) -> SessionState {
        let mut snapshot = self.snapshot.clone();
        let reached = snapshot
            .wait_for(|current| {
                current.state == target || current.state == SessionState::Disconnected
            })
            .await
            .map(|current| current.state);
        reached.unwrap_or_else(|_| snapshot.borrow().state)
    }

    /// Waits for the session to end.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::SessionClosed`] if the driver task panicked.
    pub async fn join(self) -> Result<SessionSummary, InteractionError> {
        let Self {
            requests,
            task,
            ..
        } = self;
        let summary = task.await.map_err(|_| InteractionError::SessionClosed);
        drop(requests);
        summary
    }
}

enum LinkOutcome {
    Discovered(FoundDevice),
    DiscoveryTimedOut,
    DiscoveryFailed(InteractionError),
    Connected(Box<dyn ConnectedPeripheral>),
    ConnectFailed(InteractionError),
}

type PendingOperation = Pin<Box<dyn Future<Output = LinkOutcome> + Send>>;

/// Runs a [`SessionStateMachine`] against a [`HardwareClient`] on a tokio task.
pub struct SessionDriver {
    client: Arc<dyn HardwareClient>,
    config: SessionConfig,
    machine: SessionStateMachine<QueuedLink>,
    peripheral: Option<Box<dyn ConnectedPeripheral>>,
    notifications: Option<NotificationStream>,
    pending: Option<PendingOperation>,
    discovery: Option<(DeviceMatcher, Instant)>,
    requests: mpsc::Receiver<DriverRequest>,
    snapshot: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
}

impl SessionDriver {
    /// Starts a session and returns its handle.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        client: Arc<dyn HardwareClient>,
        config: SessionConfig,
        consumer: impl SessionConsumer + 'static,
    ) -> SessionHandle {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let cancel = CancellationToken::new();

        let mut machine =
            SessionStateMachine::new(QueuedLink::default(), Arc::clone(&config.catalog));
        if let Some(matcher) = config.matcher {
            machine = machine.with_matcher(matcher);
        }

        let driver = Self {
            client,
            config,
            machine,
            peripheral: None,
            notifications: None,
            pending: None,
            discovery: None,
            requests: request_rx,
            snapshot: snapshot_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run(consumer));

        SessionHandle {
            requests: request_tx,
            snapshot: snapshot_rx,
            cancel,
            task,
        }
    }

    #[instrument(skip_all, name = "session", level = "debug")]
    async fn run(mut self, consumer: impl SessionConsumer + 'static) -> SessionSummary {
        if let Err(error) = self.machine.start(consumer) {
            warn!(%error, "session failed to start");
        }
        self.drain_link_requests().await;

        loop {
            self.publish_state();
            if self.machine.state() == SessionState::Disconnected {
                break;
            }

            tokio::select! {
                () = self.cancel.cancelled() => self.machine.stop(),
                request = self.requests.recv() => match request {
                    Some(DriverRequest::Send { command, reply }) => {
                        let result = match self.machine.send(&command) {
                            Ok(()) => self.perform_link_requests().await,
                            Err(error) => Err(error),
                        };
                        if reply.send(result).is_err() {
                            trace!("sender stopped waiting for the write result");
                        }
                    }
                    None => {
                        debug!("all session handles dropped");
                        self.machine.stop();
                    }
                },
                outcome = next_outcome(&mut self.pending) => self.handle_outcome(outcome),
                payload = next_notification(&mut self.notifications) => match payload {
                    Some(payload) => self.machine.handle_event(TransportEvent::Notification(payload)),
                    None => self.machine.handle_event(TransportEvent::Disconnected {
                        cause: Some("notification stream closed".to_string()),
                    }),
                },
            }
            self.drain_link_requests().await;
        }

        self.close_peripheral().await;
        SessionSummary {
            device: self.machine.device().cloned(),
            stats: self.machine.stats(),
            end: self.machine.end().cloned().unwrap_or(SessionEnd::Stopped),
        }
    }

    async fn drain_link_requests(&mut self) {
        if let Err(error) = self.perform_link_requests().await {
            debug!(%error, "queued write failed");
        }
    }

    fn handle_outcome(&mut self, outcome: LinkOutcome) {
        match outcome {
            LinkOutcome::Discovered(device) => {
                self.machine
                    .handle_event(TransportEvent::DeviceDiscovered(device));
                if self.machine.state() == SessionState::Scanning
                    && let Some((matcher, _)) = self.discovery
                {
                    self.begin_discovery(matcher);
                }
            }
            LinkOutcome::DiscoveryTimedOut => {
                self.machine.handle_event(TransportEvent::DiscoveryTimedOut);
            }
            LinkOutcome::DiscoveryFailed(error) => {
                self.machine.handle_event(TransportEvent::Disconnected {
                    cause: Some(error.to_string()),
                });
            }
            LinkOutcome::Connected(peripheral) => {
                self.peripheral = Some(peripheral);
                self.machine.handle_event(TransportEvent::Connected);
            }
            LinkOutcome::ConnectFailed(error) => {
                self.machine.handle_event(TransportEvent::ConnectFailed {
                    cause: error.to_string(),
                });
            }
        }
    }

    /// Performs queued link requests, returning the first write failure.
    async fn perform_link_requests(&mut self) -> Result<(), SessionError> {
        let mut outcome = Ok(());
        while let Some(request) = self.machine.link_mut().pop() {
            match request {
                LinkRequest::StartDiscovery(matcher) => self.begin_discovery(matcher),
                LinkRequest::Connect(device) => {
                    let client = Arc::clone(&self.client);
                    self.pending = Some(Box::pin(async move {
                        match client.connect(&device).await {
                            Ok(peripheral) => LinkOutcome::Connected(peripheral),
                            Err(error) => LinkOutcome::ConnectFailed(error),
                        }
                    }));
                }
                LinkRequest::Subscribe(characteristic) => {
                    if let Err(error) = self.subscribe(characteristic).await {
                        self.machine.handle_event(TransportEvent::SubscribeFailed {
                            cause: error.to_string(),
                        });
                    }
                }
                LinkRequest::Write {
                    characteristic,
                    frame,
                } => {
                    if let Err(error) = self.write(characteristic, &frame).await {
                        let cause = error.to_string();
                        self.machine.report_write_failure(cause.clone());
                        if outcome.is_ok() {
                            outcome = Err(SessionError::TransportFailure { cause });
                        }
                    }
                }
                LinkRequest::Disconnect => {
                    self.pending = None;
                    self.notifications = None;
                    self.close_peripheral().await;
                }
            }
        }
        outcome
    }

    fn begin_discovery(&mut self, matcher: DeviceMatcher) {
        let deadline = match self.discovery {
            Some((_, deadline)) => deadline,
            None => Instant::now() + self.config.scan_timeout,
        };
        self.discovery = Some((matcher, deadline));

        let client = Arc::clone(&self.client);
        self.pending = Some(Box::pin(async move {
            match timeout_at(deadline, client.discover(&matcher)).await {
                Ok(Ok(device)) => LinkOutcome::Discovered(device),
                Ok(Err(error)) => LinkOutcome::DiscoveryFailed(error),
                Err(_) => LinkOutcome::DiscoveryTimedOut,
            }
        }));
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), InteractionError> {
        let peripheral = self
            .peripheral
            .as_ref()
            .ok_or(InteractionError::SessionClosed)?;
        peripheral.subscribe(characteristic).await?;
        self.notifications = Some(peripheral.notifications().await?);
        Ok(())
    }

    async fn write(&mut self, characteristic: Uuid, frame: &[u8]) -> Result<(), InteractionError> {
        let peripheral = self
            .peripheral
            .as_ref()
            .ok_or(InteractionError::SessionClosed)?;
        peripheral
            .write(characteristic, frame, self.config.write_mode)
            .await
    }

    async fn close_peripheral(&mut self) {
        if let Some(peripheral) = self.peripheral.take()
            && let Err(error) = peripheral.close().await
        {
            debug!(?error, "failed to close peripheral cleanly");
        }
    }

    fn publish_state(&self) {
        let state = self.machine.state();
        let device = self.machine.device();
        self.snapshot.send_if_modified(|current| {
            if current.state == state && current.device.as_ref() == device {
                return false;
            }
            current.state = state;
            current.device = device.cloned();
            true
        });
    }
}

async fn next_outcome(pending: &mut Option<PendingOperation>) -> LinkOutcome {
    let Some(operation) = pending.as_mut() else {
        return std::future::pending().await;
    };
    let outcome = operation.await;
    *pending = None;
    outcome
}

async fn next_notification(stream: &mut Option<NotificationStream>) -> Option<RawPayload> {
    let Some(notifications) = stream.as_mut() else {
        return std::future::pending().await;
    };
    let payload = notifications.next().await;
    if payload.is_none() {
        *stream = None;
    }
    payload
}
