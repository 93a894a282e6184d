//! # CanVis-RS: Real-time CAN Bus Analyzer
//!
//! Connects to a CAN bus, ingests the frame stream on a dedicated thread and
//! fans it out to a receive table, a CSV log and a live plot, while allowing
//! frames to be injected onto the bus.
//!
//! ## Architecture
//!
//! - **Backend**: Owns the bus adapter on a per-session worker thread and the
//!   connection state machine that starts and stops it
//! - **Pipeline**: Dispatch channel from the worker to the consumer, the message
//!   router, and the bounded plot buffer
//! - **Session**: CSV log writer
//! - **Frontend**: Display and plot collaborator traits, status surface, table rows
//! - **Communication**: Crossbeam channels are the only thing the two threads share
//!
//! ## Configuration
//!
//! Configuration is stored in the platform-appropriate data directory under
//! `dev.canvis-rs`:
//!
//! - **Linux**: `~/.local/share/dev.canvis-rs/`
//! - **macOS**: `~/Library/Application Support/dev.canvis-rs/`
//! - **Windows**: `%APPDATA%\dev.canvis-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use canvis_rs::{
//!     app::AnalyzerApp,
//!     backend::DefaultBusFactory,
//!     config::{AppConfig, ConnectionConfig},
//!     frontend::{ConsoleDisplay, NullPlotView},
//! };
//!
//! let mut config = AppConfig::default();
//! config.connection = ConnectionConfig::virtual_bus("test0");
//!
//! let factory = Arc::new(DefaultBusFactory::default());
//! let mut app = AnalyzerApp::new(config, factory, ConsoleDisplay::new(), NullPlotView);
//! app.connect()?;
//! app.start_logging(None)?;
//! loop {
//!     app.tick(Duration::from_millis(100));
//! }
//! ```

pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod frontend;
pub mod pipeline;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use app::AnalyzerApp;
pub use backend::{BusAdapter, BusFactory, ConnectionManager, DefaultBusFactory, SessionEvent};
pub use config::{AppConfig, BusInterface, ConnectionConfig};
pub use error::{CanVisError, Result};
pub use types::{CanFrame, ConnectionState, FrameKind, SessionStats};
