//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use canvis_rs::backend::{ConnectionManager, DefaultBusFactory, SessionEvent, VirtualHub};
use canvis_rs::config::ShutdownConfig;
use canvis_rs::types::ConnectionState;

/// Upper bound for anything a test waits on
pub fn test_deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

/// Manager backed by a fresh virtual hub
pub fn virtual_manager() -> (ConnectionManager, VirtualHub) {
    let hub = VirtualHub::new();
    let factory = Arc::new(DefaultBusFactory::new(hub.clone()));
    (
        ConnectionManager::new(factory, ShutdownConfig::default()),
        hub,
    )
}

/// Poll `manager` until `done` holds for everything collected so far
pub fn poll_until(
    manager: &mut ConnectionManager,
    done: impl Fn(&ConnectionManager, &[SessionEvent]) -> bool,
) -> Vec<SessionEvent> {
    let deadline = test_deadline();
    let mut events = Vec::new();
    while Instant::now() < deadline {
        events.extend(manager.poll(Duration::from_millis(20)));
        if done(manager, &events) {
            break;
        }
    }
    events
}

/// Wait until `manager` is connected
pub fn wait_connected(manager: &mut ConnectionManager) -> Vec<SessionEvent> {
    let events = poll_until(manager, |m, _| m.state() == ConnectionState::Connected);
    assert_eq!(manager.state(), ConnectionState::Connected, "never connected: {:?}", events);
    events
}

/// State transitions in the order they were reported
pub fn states(events: &[SessionEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

/// Spin until `cond` holds or the deadline passes
pub fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = test_deadline();
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
