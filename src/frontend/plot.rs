//! Plot refresh cadence
//!
//! The plot is redrawn on its own timer, independent of how fast frames
//! arrive. Each due tick copies every series out of the [`PlotBuffer`] and
//! hands it to the [`PlotView`].

use std::time::{Duration, Instant};

use super::PlotView;
use crate::pipeline::plot_buffer::PlotBuffer;

/// Fixed-interval timer driven by the consumer loop
#[derive(Debug, Clone)]
pub struct PlotRefreshTimer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl PlotRefreshTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if self.next_due.is_none() {
            tracing::debug!("Plot refresh started ({} ms)", self.interval.as_millis());
            self.next_due = Some(now + self.interval);
        }
    }

    pub fn stop(&mut self) {
        if self.next_due.take().is_some() {
            tracing::debug!("Plot refresh stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a redraw is due; advances the timer if so
    ///
    /// Missed ticks are not replayed.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(t) if now >= t => {
                let mut next = t + self.interval;
                if next <= now {
                    next = now + self.interval;
                }
                self.next_due = Some(next);
                true
            }
            _ => false,
        }
    }
}

/// Redraw every series; returns how many were drawn
pub fn refresh(buffer: &PlotBuffer, view: &mut dyn PlotView) -> usize {
    let ids = buffer.ids();
    for &id in &ids {
        let samples = buffer.snapshot(id);
        view.redraw(id, &samples);
    }
    ids.len()
}
