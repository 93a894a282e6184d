//! Frontend collaborators
//!
//! The analyzer core does not render anything itself. It talks to a
//! display through [`FrameDisplay`] and to a plot through [`PlotView`], so a
//! GUI toolkit, a terminal, or a test can sit on the other side.
//!
//! # Main Types
//!
//! - [`FrameRow`] - One formatted row of the receive table
//! - [`StatusBar`] - Connection line plus timed or sticky messages
//! - [`PlotRefreshTimer`] - Redraw cadence for the plot
//! - [`ConsoleDisplay`] - Rows to stdout, status to stderr
//! - [`MemoryDisplay`] / [`MemoryPlotView`] - Collect everything in memory

pub mod plot;
pub mod status_bar;
pub mod table;

pub use plot::{refresh, PlotRefreshTimer};
pub use status_bar::{StatusBar, StatusMessage};
pub use table::{FrameRow, COLUMNS};

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use crate::pipeline::PlotSample;

/// Receives table rows and status updates
pub trait FrameDisplay {
    /// Append one row; rows arrive in reception order
    fn append_row(&mut self, row: FrameRow);

    /// The status line changed
    fn show_status(&mut self, _text: &str) {}

    /// An error was reported; `duration` is `None` for sticky errors
    fn show_error(&mut self, _message: &str, _duration: Option<Duration>) {}
}

/// Draws plot series
pub trait PlotView {
    /// Replace the drawn series for `id`
    fn redraw(&mut self, id: u32, samples: &[PlotSample]);

    /// Remove all series
    fn clear(&mut self) {}
}

/// Display that keeps everything it is given
#[derive(Debug, Default, Clone)]
pub struct MemoryDisplay {
    pub rows: Vec<FrameRow>,
    pub statuses: Vec<String>,
    pub errors: Vec<(String, Option<Duration>)>,
}

impl FrameDisplay for MemoryDisplay {
    fn append_row(&mut self, row: FrameRow) {
        self.rows.push(row);
    }

    fn show_status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }

    fn show_error(&mut self, message: &str, duration: Option<Duration>) {
        self.errors.push((message.to_string(), duration));
    }
}

/// Plot view that keeps the last drawn samples per id
#[derive(Debug, Default, Clone)]
pub struct MemoryPlotView {
    pub series: BTreeMap<u32, Vec<PlotSample>>,
    pub redraws: u64,
}

impl PlotView for MemoryPlotView {
    fn redraw(&mut self, id: u32, samples: &[PlotSample]) {
        self.series.insert(id, samples.to_vec());
        self.redraws += 1;
    }

    fn clear(&mut self) {
        self.series.clear();
    }
}

/// Plot view that draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlotView;

impl PlotView for NullPlotView {
    fn redraw(&mut self, _id: u32, _samples: &[PlotSample]) {}
}

/// Terminal display: one line per frame on stdout, status on stderr
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    header_printed: bool,
    quiet: bool,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress frame rows, keep status output
    pub fn quiet() -> Self {
        Self {
            header_printed: false,
            quiet: true,
        }
    }
}

impl FrameDisplay for ConsoleDisplay {
    fn append_row(&mut self, row: FrameRow) {
        if self.quiet {
            return;
        }
        let mut out = std::io::stdout().lock();
        if !self.header_printed {
            let _ = writeln!(out, "{}", COLUMNS.join("\t"));
            self.header_printed = true;
        }
        let _ = writeln!(out, "{}", row);
    }

    fn show_status(&mut self, text: &str) {
        eprintln!("[status] {}", text);
    }

    fn show_error(&mut self, message: &str, _duration: Option<Duration>) {
        eprintln!("[error] {}", message);
    }
}
