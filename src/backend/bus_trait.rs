//! BusAdapter trait for a unified transport interface
//!
//! The ingestion worker only talks to the bus through this trait, so the
//! same worker drives the in-process virtual bus, hardware transports and
//! mocks in tests.

use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::error::AdapterError;
use crate::types::CanFrame;

/// An open bus session
///
/// Implementations are owned by exactly one worker thread and never shared.
#[cfg_attr(test, mockall::automock)]
pub trait BusAdapter: Send {
    /// Short description of the open channel, for logs and status lines
    fn channel_info(&self) -> String;

    /// Wait up to `timeout` for the next frame
    ///
    /// `Ok(None)` means nothing arrived in time. Implementations must honour
    /// the timeout so the worker can observe its stop flag.
    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, AdapterError>;

    /// Put a frame on the bus
    fn send(&mut self, frame: &CanFrame) -> Result<(), AdapterError>;

    /// Release the underlying device; must be safe to call more than once
    fn close(&mut self);
}

/// Opens bus adapters from a connection config
pub trait BusFactory: Send + Sync {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn BusAdapter>, AdapterError>;
}

impl<F> BusFactory for F
where
    F: Fn(&ConnectionConfig) -> Result<Box<dyn BusAdapter>, AdapterError> + Send + Sync,
{
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn BusAdapter>, AdapterError> {
        self(config)
    }
}
