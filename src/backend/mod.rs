//! Backend module for bus ingestion
//!
//! This module owns everything that runs on the bus-reading thread and the
//! state machine that starts and stops it.
//!
//! # Architecture
//!
//! Each session gets its own worker thread and its own pair of channels:
//!
//! - [`WorkerEvent`] - Messages sent from the worker to the consumer (frames, errors, lifecycle)
//! - [`WorkerCommand`] - Messages sent from the consumer to the worker (outbound frames)
//! - [`IngestionWorker`] - Spawns the bus thread and returns a [`WorkerHandle`]
//! - [`ConnectionManager`] - Session state machine on the consumer side
//!
//! # Components
//!
//! - [`BusAdapter`] / [`BusFactory`] - Transport boundary
//! - [`VirtualHub`] / [`VirtualBus`] - In-process virtual bus
//! - [`DefaultBusFactory`] - Factory used by the binary
//!
//! # Example
//!
//! ```ignore
//! use canvis_rs::backend::{ConnectionManager, DefaultBusFactory, SessionEvent};
//! use canvis_rs::config::{ConnectionConfig, ShutdownConfig};
//!
//! let factory = Arc::new(DefaultBusFactory::default());
//! let mut manager = ConnectionManager::new(factory, ShutdownConfig::default());
//! manager.connect(&ConnectionConfig::virtual_bus("test0"))?;
//!
//! for event in manager.poll(Duration::from_millis(100)) {
//!     if let SessionEvent::Frame(frame) = event {
//!         println!("{:X}", frame.arbitration_id);
//!     }
//! }
//! manager.disconnect();
//! ```

pub mod bus_trait;
pub mod manager;
pub mod virtual_bus;
pub mod worker;

pub use bus_trait::{BusAdapter, BusFactory};
pub use manager::{ConnectionManager, SessionEvent};
pub use virtual_bus::{TrafficGenerator, VirtualBus, VirtualHub};
pub use worker::{IngestionWorker, WorkerHandle};

#[cfg(test)]
pub use bus_trait::MockBusAdapter;

use crate::config::{BusInterface, ConnectionConfig};
use crate::error::{AdapterError, SendError};
use crate::types::CanFrame;

/// Message sent from the worker to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// The adapter opened successfully
    Opened { channel_info: String },
    /// A frame was received
    Frame(CanFrame),
    /// The adapter could not be opened; the worker has exited its read loop
    OpenFailed(AdapterError),
    /// The adapter reported an error while reading
    ///
    /// If [`AdapterError::ends_session`] holds, the worker has stopped
    /// reading and closed the adapter; otherwise reading continues.
    AdapterError(AdapterError),
    /// An outbound frame was accepted by the transport
    Sent(CanFrame),
    /// An outbound frame was rejected
    SendFailed { frame: CanFrame, error: SendError },
    /// The worker thread is about to exit
    Stopped,
}

/// Message sent from the consumer to the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    /// Put a frame on the bus
    Send(CanFrame),
}

/// Factory used by the application
///
/// The virtual interface is served in-process. The hardware interfaces need
/// a transport stack this crate does not ship, so opening them reports the
/// device as absent.
#[derive(Debug, Clone, Default)]
pub struct DefaultBusFactory {
    hub: VirtualHub,
}

impl DefaultBusFactory {
    pub fn new(hub: VirtualHub) -> Self {
        Self { hub }
    }

    /// The hub serving the virtual interface
    pub fn hub(&self) -> &VirtualHub {
        &self.hub
    }
}

impl BusFactory for DefaultBusFactory {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn BusAdapter>, AdapterError> {
        match config.interface {
            BusInterface::Virtual => Ok(Box::new(self.hub.open(&config.channel))),
            other => Err(AdapterError::device_not_found(format!(
                "{} channel '{}': No such device (no {} transport available)",
                other, config.channel, other
            ))),
        }
    }
}
