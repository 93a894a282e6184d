//! Connection manager
//!
//! Session state machine on the consumer side. It starts a fresh
//! [`IngestionWorker`] for every connect, turns the worker's events into
//! [`SessionEvent`]s, and owns the shutdown policy: stop the worker, wait a
//! bounded time, and detach it if it does not exit.
//!
//! ```text
//!                 connect                 Opened / first frame
//! Disconnected ─────────────► Connecting ───────────────────────► Connected
//!      ▲                          │                                   │
//!      │                          │ disconnect / open failure         │ disconnect / fatal error
//!      │                          ▼                                   │
//!      └──────────────────── Disconnecting ◄──────────────────────────┘
//! ```
//!
//! All methods run on the consumer thread. `disconnect` blocks for at most
//! the configured graceful timeout.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::bus_trait::BusFactory;
use super::worker::{IngestionWorker, WorkerHandle};
use super::WorkerEvent;
use crate::config::{ConnectionConfig, ShutdownConfig};
use crate::error::{ConnectError, ErrorEvent, SendError};
use crate::pipeline::bridge::DispatchReceiver;
use crate::types::{CanFrame, ConnectionState};

/// Upper bound on worker events handled per poll
const POLL_BATCH_LIMIT: usize = 4096;

/// What the consumer is told about the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    Frame(CanFrame),
    /// An outbound frame reached the bus
    Sent(CanFrame),
    Error(ErrorEvent),
}

/// Owns the worker of the current session
pub struct ConnectionManager {
    factory: Arc<dyn BusFactory>,
    shutdown: ShutdownConfig,
    state: ConnectionState,
    worker: Option<WorkerHandle>,
    events: Option<DispatchReceiver<WorkerEvent>>,
    /// Config of the current session, fixed at connect time
    active: Option<ConnectionConfig>,
    outbox: VecDeque<SessionEvent>,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn BusFactory>, shutdown: ShutdownConfig) -> Self {
        Self {
            factory,
            shutdown,
            state: ConnectionState::Disconnected,
            worker: None,
            events: None,
            active: None,
            outbox: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Config of the running session, if any
    pub fn active_config(&self) -> Option<&ConnectionConfig> {
        self.active.as_ref()
    }

    /// Start a new session
    ///
    /// Only valid while `Disconnected`. The state is `Connecting` on return;
    /// it becomes `Connected` once the worker confirms the adapter opened.
    pub fn connect(&mut self, config: &ConnectionConfig) -> Result<(), ConnectError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ConnectError::InvalidState(self.state));
        }
        config
            .validate()
            .map_err(|e| ConnectError::InvalidConfig(e.to_string()))?;

        tracing::info!("Connecting to {}", config.describe());
        self.transition(ConnectionState::Connecting);

        match IngestionWorker::start(config, Arc::clone(&self.factory), self.shutdown.poll_interval())
        {
            Ok((worker, events)) => {
                self.worker = Some(worker);
                self.events = Some(events);
                self.active = Some(config.clone());
                Ok(())
            }
            Err(e) => {
                tracing::error!("Connect failed: {}", e);
                self.transition(ConnectionState::Disconnected);
                self.outbox
                    .push_back(SessionEvent::Error(ErrorEvent::Connect(e.clone())));
                Err(e)
            }
        }
    }

    /// End the current session
    ///
    /// Stops the worker and waits up to the graceful timeout. A worker that
    /// does not exit in time is detached and a
    /// [`ErrorEvent::ShutdownTimeout`] is queued. Events the worker produced
    /// before it stopped are still delivered by the next [`poll`](Self::poll).
    pub fn disconnect(&mut self) {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Disconnecting => {
                tracing::debug!("Disconnect ignored while {}", self.state);
                return;
            }
            ConnectionState::Connecting | ConnectionState::Connected => {}
        }

        let Some(mut worker) = self.worker.take() else {
            self.finish_session();
            return;
        };

        worker.stop();
        self.transition(ConnectionState::Disconnecting);

        let timeout = self.shutdown.graceful_timeout();
        let start = Instant::now();
        let timed_out = !worker.wait(timeout);
        if timed_out {
            tracing::warn!(
                "Bus thread did not stop within {} ms, forcing termination",
                timeout.as_millis()
            );
            worker.abandon();
        } else {
            tracing::info!("Bus thread stopped after {} ms", start.elapsed().as_millis());
        }

        let mut sticky = Vec::new();
        if let Some(events) = self.events.take() {
            for event in events.drain() {
                self.absorb_trailing(event, &mut sticky);
            }
        }
        self.finish_session();

        // Sticky errors go after the transition so it does not clear them
        if timed_out {
            sticky.push(ErrorEvent::ShutdownTimeout { waited: timeout });
        }
        self.outbox
            .extend(sticky.into_iter().map(SessionEvent::Error));
    }

    /// Queue a frame for transmission on the current session
    ///
    /// The outcome arrives later from [`poll`](Self::poll) as
    /// [`SessionEvent::Sent`] or a send error.
    pub fn send(&self, frame: CanFrame) -> Result<(), SendError> {
        if self.state != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }
        match &self.worker {
            Some(worker) => worker.send(frame),
            None => Err(SendError::NotConnected),
        }
    }

    /// Collect session events
    ///
    /// Waits up to `max_wait` for the first worker event, then takes whatever
    /// else is queued. Fatal adapter errors and open failures tear the
    /// session down before this returns.
    pub fn poll(&mut self, max_wait: Duration) -> Vec<SessionEvent> {
        let batch = match &self.events {
            Some(events) => {
                let deadline = if self.outbox.is_empty() {
                    Instant::now() + max_wait
                } else {
                    Instant::now()
                };
                events.drain_until(deadline, POLL_BATCH_LIMIT)
            }
            None => {
                if self.outbox.is_empty() && !max_wait.is_zero() {
                    std::thread::sleep(max_wait);
                }
                Vec::new()
            }
        };

        let mut teardown = false;
        let mut worker_exited = false;
        let mut open_failure = None;
        for event in batch {
            match event {
                WorkerEvent::Opened { channel_info } => {
                    tracing::info!("Bus open: {}", channel_info);
                    if self.state == ConnectionState::Connecting {
                        self.transition(ConnectionState::Connected);
                    }
                }
                WorkerEvent::Frame(frame) => {
                    if self.state == ConnectionState::Connecting {
                        self.transition(ConnectionState::Connected);
                    }
                    self.outbox.push_back(SessionEvent::Frame(frame));
                }
                WorkerEvent::OpenFailed(e) => {
                    open_failure = Some(ConnectError::Open(e));
                    teardown = true;
                }
                WorkerEvent::AdapterError(e) => {
                    if e.ends_session() {
                        tracing::warn!("Device lost ({}), disconnecting", e);
                        teardown = true;
                    } else {
                        tracing::warn!("Bus error: {}", e);
                    }
                    self.outbox
                        .push_back(SessionEvent::Error(ErrorEvent::Adapter(e)));
                }
                WorkerEvent::Sent(frame) => self.outbox.push_back(SessionEvent::Sent(frame)),
                WorkerEvent::SendFailed { frame, error } => {
                    tracing::debug!("Send of {} failed: {}", frame.id_hex(), error);
                    self.outbox
                        .push_back(SessionEvent::Error(ErrorEvent::Send(error)));
                }
                WorkerEvent::Stopped => worker_exited = true,
            }
        }

        if !worker_exited && self.state.is_active() {
            worker_exited = self.worker.as_ref().map(WorkerHandle::is_finished).unwrap_or(false);
        }

        if teardown {
            self.disconnect();
        } else if worker_exited && self.state.is_active() {
            tracing::warn!("Bus thread exited on its own");
            self.disconnect();
        }
        if let Some(e) = open_failure {
            self.outbox
                .push_back(SessionEvent::Error(ErrorEvent::Connect(e)));
        }

        self.outbox.drain(..).collect()
    }

    /// Queue an event that arrived while the worker was shutting down
    fn absorb_trailing(&mut self, event: WorkerEvent, sticky: &mut Vec<ErrorEvent>) {
        match event {
            WorkerEvent::Frame(frame) => self.outbox.push_back(SessionEvent::Frame(frame)),
            WorkerEvent::Sent(frame) => self.outbox.push_back(SessionEvent::Sent(frame)),
            WorkerEvent::AdapterError(e) => self
                .outbox
                .push_back(SessionEvent::Error(ErrorEvent::Adapter(e))),
            WorkerEvent::OpenFailed(e) => sticky.push(ErrorEvent::Connect(ConnectError::Open(e))),
            WorkerEvent::SendFailed { error, .. } => self
                .outbox
                .push_back(SessionEvent::Error(ErrorEvent::Send(error))),
            WorkerEvent::Opened { .. } | WorkerEvent::Stopped => {}
        }
    }

    fn finish_session(&mut self) {
        self.worker = None;
        self.events = None;
        if let Some(config) = self.active.take() {
            tracing::debug!("Session on {} discarded", config.describe());
        }
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::info!("Connection state: {} -> {}", self.state, next);
        self.state = next;
        self.outbox.push_back(SessionEvent::StateChanged(next));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BusAdapter, DefaultBusFactory, VirtualHub};
    use crate::error::AdapterError;

    const WAIT: Duration = Duration::from_millis(50);

    fn manager_with_hub() -> (ConnectionManager, VirtualHub) {
        let hub = VirtualHub::new();
        let factory = Arc::new(DefaultBusFactory::new(hub.clone()));
        (ConnectionManager::new(factory, ShutdownConfig::default()), hub)
    }

    fn poll_until(
        manager: &mut ConnectionManager,
        done: impl Fn(&ConnectionManager, &[SessionEvent]) -> bool,
    ) -> Vec<SessionEvent> {
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut all = Vec::new();
        while Instant::now() < deadline {
            all.extend(manager.poll(WAIT));
            if done(manager, &all) {
                break;
            }
        }
        all
    }

    fn states(events: &[SessionEvent]) -> Vec<ConnectionState> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_then_confirmed() {
        let (mut manager, _hub) = manager_with_hub();
        manager.connect(&ConnectionConfig::virtual_bus("test0")).unwrap();
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let events = poll_until(&mut manager, |m, _| m.is_connected());
        assert_eq!(
            states(&events),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
        assert_eq!(manager.active_config().unwrap().channel, "test0");

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.active_config().is_none());
    }

    #[test]
    fn test_connect_rejected_while_active() {
        let (mut manager, _hub) = manager_with_hub();
        let config = ConnectionConfig::virtual_bus("test0");
        manager.connect(&config).unwrap();
        assert_eq!(
            manager.connect(&config),
            Err(ConnectError::InvalidState(ConnectionState::Connecting))
        );
        manager.disconnect();
    }

    #[test]
    fn test_immediate_disconnect() {
        let (mut manager, _hub) = manager_with_hub();
        manager.connect(&ConnectionConfig::virtual_bus("test0")).unwrap();
        manager.disconnect();

        let events = manager.poll(Duration::ZERO);
        assert_eq!(
            states(&events),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Disconnecting,
                ConnectionState::Disconnected
            ]
        );
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Error(_))));
    }

    #[test]
    fn test_open_failure_returns_to_disconnected() {
        let factory: Arc<dyn BusFactory> = Arc::new(
            |_: &ConnectionConfig| -> Result<Box<dyn BusAdapter>, AdapterError> {
                Err(AdapterError::bus("permission denied"))
            },
        );
        let mut manager = ConnectionManager::new(factory, ShutdownConfig::default());
        manager.connect(&ConnectionConfig::virtual_bus("x")).unwrap();

        let events = poll_until(&mut manager, |m, _| !m.state().is_active());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error(ErrorEvent::Connect(ConnectError::Open(_)))
        )));
        assert!(!states(&events).contains(&ConnectionState::Connected));
    }

    #[test]
    fn test_fatal_error_auto_disconnects() {
        let (mut manager, hub) = manager_with_hub();
        manager.connect(&ConnectionConfig::virtual_bus("dev")).unwrap();
        poll_until(&mut manager, |m, _| m.is_connected());

        hub.fail_channel("dev", AdapterError::bus("[Errno 19] No such device"));
        let events = poll_until(&mut manager, |m, _| !m.state().is_active());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Error(ErrorEvent::Adapter(_)))));
        assert_eq!(hub.handle_count("dev"), 0);
    }

    #[test]
    fn test_transient_error_keeps_session() {
        let (mut manager, hub) = manager_with_hub();
        manager.connect(&ConnectionConfig::virtual_bus("flaky")).unwrap();
        poll_until(&mut manager, |m, _| m.is_connected());

        hub.fail_channel("flaky", AdapterError::bus("error passive"));
        let events = poll_until(&mut manager, |_, all| {
            all.iter().any(|e| matches!(e, SessionEvent::Error(_)))
        });
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Error(ErrorEvent::Adapter(_)))));
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_requires_connected() {
        let (mut manager, hub) = manager_with_hub();
        let frame = CanFrame::data_frame(0x123, &[1, 2]).unwrap();
        assert_eq!(manager.send(frame.clone()), Err(SendError::NotConnected));

        let mut peer = hub.open("tx");
        manager.connect(&ConnectionConfig::virtual_bus("tx")).unwrap();
        poll_until(&mut manager, |m, _| m.is_connected());

        manager.send(frame.clone()).unwrap();
        let received = peer.recv(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(received.arbitration_id, 0x123);
        assert_eq!(peer.recv(Duration::from_millis(50)).unwrap(), None);

        let events = poll_until(&mut manager, |_, all| {
            all.iter().any(|e| matches!(e, SessionEvent::Sent(_)))
        });
        assert!(events.contains(&SessionEvent::Sent(frame)));

        manager.disconnect();
    }

    #[test]
    fn test_frames_delivered_and_reconnect() {
        let (mut manager, hub) = manager_with_hub();
        let mut peer = hub.open("rx");

        for round in 0..2u8 {
            manager.connect(&ConnectionConfig::virtual_bus("rx")).unwrap();
            poll_until(&mut manager, |m, _| m.is_connected());

            for i in 0..10u8 {
                peer.send(&CanFrame::data_frame(0x100, &[round, i]).unwrap())
                    .unwrap();
            }
            let events = poll_until(&mut manager, |_, all| {
                all.iter().filter(|e| matches!(e, SessionEvent::Frame(_))).count() == 10
            });
            let payloads: Vec<Vec<u8>> = events
                .iter()
                .filter_map(|e| match e {
                    SessionEvent::Frame(f) => Some(f.data.clone()),
                    _ => None,
                })
                .collect();
            let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![round, i]).collect();
            assert_eq!(payloads, expected);

            manager.disconnect();
        }
    }
}
