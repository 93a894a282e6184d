//! Consumer-side data path.
//!
//! Frames leave the bus thread through the dispatch channel and are fanned
//! out by the router on the consumer thread:
//!
//! ```text
//! [IngestionWorker] ──► DispatchChannel ──► [MessageRouter] ──► display
//!                                                         ├──► LogWriter
//!                                                         └──► PlotBuffer
//! ```
//!
//! Everything downstream of the channel is single-threaded; the channel is
//! the only synchronization point with the bus thread.

pub mod bridge;
pub mod plot_buffer;
pub mod router;

pub use bridge::{dispatch_channel, Disconnected, DispatchReceiver, DispatchSender, HIGH_WATER_MARK};
pub use plot_buffer::{PlotBuffer, PlotSample, PlotSeries};
pub use router::{MessageRouter, RouteOutcome};
