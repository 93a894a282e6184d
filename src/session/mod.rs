//! Session persistence
//!
//! Writes received traffic to disk while logging is active. See
//! [`LogWriter`] for the file lifecycle and [`LogRecord`] for the row layout.

pub mod log_writer;

pub use log_writer::{LogRecord, LogWriter, LOG_HEADER};
