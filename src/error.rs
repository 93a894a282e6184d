//! Error handling for CanVis-RS
//!
//! This module defines the crate-level error type and a Result alias, plus the
//! error taxonomy that travels between the bus-reading thread and the consumer:
//!
//! - [`ConnectError`] - the adapter could not be opened (session stays Disconnected)
//! - [`AdapterError`] - runtime read/bus error, classified fatal or transient
//! - [`SendError`] - an outbound frame was rejected
//! - [`LogWriteError`] - a CSV row could not be written
//! - [`ErrorEvent`] - what the status surface is told about
//!
//! Errors raised on the worker thread never cross the thread boundary as
//! panics or `Result`s; they are converted to events and sent over the same
//! channel as frames.

use crate::types::ConnectionState;
use std::time::Duration;
use thiserror::Error;

/// Message fragments that identify a missing device, matched case-insensitively
pub const DEVICE_ABSENT_MARKERS: &[&str] = &[
    "no such device",
    "cannot find specified device",
    "device not found",
];

/// Main error type for CanVis-RS operations
#[derive(Error, Debug)]
pub enum CanVisError {
    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connect attempt failed
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Outbound frame rejected
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    /// CSV log write failed
    #[error("Log write error: {0}")]
    LogWrite(#[from] LogWriteError),

    /// A frame violates the data model invariants
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CanVisError>,
    },
}

impl CanVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CanVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for CanVis-RS operations
pub type Result<T> = std::result::Result<T, CanVisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<CanVisError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Into::<CanVisError>::into(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Into::<CanVisError>::into(e).with_context(f()))
    }
}

/// Category of an adapter-reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// The interface or device does not exist (or vanished)
    DeviceNotFound,
    /// Bus-level error reported by the transport (bus-off, overrun, ...)
    Bus,
    /// Operating system I/O failure
    Io,
    /// The adapter was already closed
    Closed,
}

/// Error reported by a [`BusAdapter`](crate::backend::BusAdapter)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn device_not_found(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::DeviceNotFound, message)
    }

    pub fn bus(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Bus, message)
    }

    pub fn closed() -> Self {
        Self::new(AdapterErrorKind::Closed, "adapter is closed")
    }

    /// Whether this error means the device is gone and the session must be torn down
    ///
    /// Transports do not always categorise their errors, so the message is
    /// also checked for the usual device-absent wording.
    pub fn is_fatal(&self) -> bool {
        if self.kind == AdapterErrorKind::DeviceNotFound {
            return true;
        }
        let lower = self.message.to_lowercase();
        DEVICE_ABSENT_MARKERS.iter().any(|m| lower.contains(m))
    }

    /// Whether the adapter cannot be read from any more
    pub fn ends_session(&self) -> bool {
        self.is_fatal() || self.kind == AdapterErrorKind::Closed
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => AdapterErrorKind::DeviceNotFound,
            _ => AdapterErrorKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

/// The bus could not be opened, or a connect was requested in the wrong state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("cannot connect while {0}")]
    InvalidState(ConnectionState),

    #[error("invalid connection settings: {0}")]
    InvalidConfig(String),

    #[error("failed to open bus: {0}")]
    Open(AdapterError),

    #[error("failed to start bus thread: {0}")]
    Spawn(String),
}

/// An outbound frame was not put on the bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,

    #[error("transport rejected frame: {0}")]
    Transport(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// A CSV log row could not be written
#[derive(Error, Debug)]
pub enum LogWriteError {
    #[error("log is closed")]
    Closed,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Error notification for the status surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorEvent {
    Connect(ConnectError),
    Adapter(AdapterError),
    Send(SendError),
    LogWrite(String),
    ShutdownTimeout { waited: Duration },
}

impl ErrorEvent {
    /// Sticky events stay on the status surface until acknowledged or
    /// superseded by a state transition
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            ErrorEvent::Connect(_) | ErrorEvent::ShutdownTimeout { .. }
        )
    }
}

impl std::fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorEvent::Connect(e) => write!(f, "Connect Error: {}", e),
            ErrorEvent::Adapter(e) => write!(f, "CAN Error: {}", e),
            ErrorEvent::Send(e) => write!(f, "Send Error: {}", e),
            ErrorEvent::LogWrite(msg) => write!(f, "Log Write Error: {}", msg),
            ErrorEvent::ShutdownTimeout { waited } => write!(
                f,
                "Bus thread did not stop within {} ms and was abandoned",
                waited.as_millis()
            ),
        }
    }
}
