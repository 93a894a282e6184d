//! Message router
//!
//! Fans each received frame out to the display, the CSV log and the plot
//! buffer. A router lives for exactly one session: it is built on connect,
//! owns that session's sequence counter and plot history, and is dropped
//! when the session ends.
//!
//! Per frame the order is fixed:
//! 1. bump the sequence counter
//! 2. append a row to the display
//! 3. write a log record, if logging is active
//! 4. sample the configured byte, if the id is subscribed

use std::collections::HashMap;

use crate::config::{PlotConfig, PlotSubscription};
use crate::error::LogWriteError;
use crate::frontend::{FrameDisplay, FrameRow};
use crate::pipeline::plot_buffer::{PlotBuffer, PlotSample};
use crate::session::{LogRecord, LogWriter};
use crate::types::CanFrame;

/// What happened to one routed frame
#[derive(Debug)]
pub struct RouteOutcome {
    /// Sequence number assigned to the frame
    pub sequence: u64,
    /// Whether a row was appended to the log
    pub logged: bool,
    /// Log failure, if the write was attempted and failed
    pub log_error: Option<LogWriteError>,
    /// Whether a plot sample was recorded
    pub plotted: bool,
}

/// Consumer-side fan-out for one session
#[derive(Debug)]
pub struct MessageRouter {
    sequence: u64,
    /// id -> byte index to sample
    subscriptions: HashMap<u32, usize>,
    plot: PlotBuffer,
    /// Bus label used when a frame carries none
    fallback_channel: String,
}

impl MessageRouter {
    pub fn new(plot: &PlotConfig, fallback_channel: impl Into<String>) -> Self {
        let subscriptions = plot
            .subscriptions
            .iter()
            .map(|s| (s.id, s.byte_index))
            .collect();
        Self {
            sequence: 0,
            subscriptions,
            plot: PlotBuffer::new(plot.capacity),
            fallback_channel: fallback_channel.into(),
        }
    }

    /// Route one frame
    pub fn route(
        &mut self,
        frame: &CanFrame,
        display: &mut dyn FrameDisplay,
        log: Option<&mut LogWriter>,
    ) -> RouteOutcome {
        self.sequence += 1;
        let sequence = self.sequence;

        display.append_row(FrameRow::from_frame(frame, sequence, &self.fallback_channel));

        let mut logged = false;
        let mut log_error = None;
        if let Some(writer) = log {
            let record = LogRecord::from_frame(frame, sequence, &self.fallback_channel);
            match writer.write(&record) {
                Ok(()) => logged = true,
                Err(e) => {
                    tracing::warn!("Failed to write log row {}: {}", sequence, e);
                    log_error = Some(e);
                }
            }
        }

        let plotted = self.sample(frame, sequence);

        RouteOutcome {
            sequence,
            logged,
            log_error,
            plotted,
        }
    }

    fn sample(&mut self, frame: &CanFrame, sequence: u64) -> bool {
        if !frame.is_data_frame() || frame.dlc == 0 {
            return false;
        }
        let Some(&byte_index) = self.subscriptions.get(&frame.arbitration_id) else {
            return false;
        };
        if byte_index >= frame.dlc as usize {
            return false;
        }
        match frame.data.get(byte_index) {
            Some(&value) => {
                self.plot
                    .upsert(frame.arbitration_id, PlotSample::new(sequence, value as f64));
                true
            }
            None => false,
        }
    }

    /// Add or replace a plot subscription
    pub fn subscribe(&mut self, subscription: PlotSubscription) {
        self.subscriptions
            .insert(subscription.id, subscription.byte_index);
    }

    pub fn unsubscribe(&mut self, id: u32) {
        self.subscriptions.remove(&id);
    }

    pub fn is_subscribed(&self, id: u32) -> bool {
        self.subscriptions.contains_key(&id)
    }

    /// Number of frames routed so far in this session
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn plot(&self) -> &PlotBuffer {
        &self.plot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::MemoryDisplay;

    fn router() -> MessageRouter {
        MessageRouter::new(&PlotConfig::default(), "test0")
    }

    #[test]
    fn test_sequence_and_display_order() {
        let mut router = router();
        let mut display = MemoryDisplay::default();

        for i in 0..5u8 {
            let frame = CanFrame::data_frame(0x100 + i as u32, &[i]).unwrap();
            let outcome = router.route(&frame, &mut display, None);
            assert_eq!(outcome.sequence, i as u64 + 1);
            assert!(!outcome.logged);
        }

        let counts: Vec<u64> = display.rows.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5]);
        assert_eq!(display.rows[0].bus, "test0");
    }

    #[test]
    fn test_plot_only_subscribed_data_frames() {
        let mut router = router();
        let mut display = MemoryDisplay::default();

        let sampled = CanFrame::data_frame(0x18FF03EF, &[0x2A, 0x01]).unwrap();
        let other = CanFrame::data_frame(0x123, &[0x01]).unwrap();
        let empty = CanFrame::data_frame(0x18FF03EF, &[]).unwrap();
        let remote = CanFrame::remote_frame(0x18FF03EF, 2).unwrap();

        assert!(router.route(&sampled, &mut display, None).plotted);
        assert!(!router.route(&other, &mut display, None).plotted);
        assert!(!router.route(&empty, &mut display, None).plotted);
        assert!(!router.route(&remote, &mut display, None).plotted);

        assert_eq!(router.plot().snapshot(0x18FF03EF), vec![PlotSample::new(1, 42.0)]);
        assert!(router.plot().snapshot(0x123).is_empty());
        // Every frame still reached the display
        assert_eq!(display.rows.len(), 4);
        assert_eq!(router.sequence(), 4);
    }

    #[test]
    fn test_byte_index_beyond_dlc_skipped() {
        let mut router = router();
        router.subscribe(PlotSubscription::new(0x10, 3));
        let mut display = MemoryDisplay::default();

        let short = CanFrame::data_frame(0x10, &[1, 2]).unwrap();
        let long = CanFrame::data_frame(0x10, &[1, 2, 3, 4]).unwrap();
        assert!(!router.route(&short, &mut display, None).plotted);
        assert!(router.route(&long, &mut display, None).plotted);
        assert_eq!(router.plot().snapshot(0x10), vec![PlotSample::new(2, 4.0)]);
    }

    #[test]
    fn test_unsubscribe_stops_sampling() {
        let mut router = router();
        router.unsubscribe(0x18FF03EF);
        assert!(!router.is_subscribed(0x18FF03EF));
        let frame = CanFrame::data_frame(0x18FF03EF, &[1]).unwrap();
        assert!(!router
            .route(&frame, &mut MemoryDisplay::default(), None)
            .plotted);
    }

    #[test]
    fn test_routes_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("route.csv");
        let mut writer = LogWriter::create(&path).unwrap();
        let mut router = router();
        let mut display = MemoryDisplay::default();

        let frame = CanFrame::data_frame(0x7FF, &[0xDE, 0xAD]).unwrap();
        let outcome = router.route(&frame, &mut display, Some(&mut writer));
        assert!(outcome.logged);
        assert!(outcome.log_error.is_none());

        writer.close();
        let outcome = router.route(&frame, &mut display, Some(&mut writer));
        assert!(!outcome.logged);
        assert!(matches!(outcome.log_error, Some(LogWriteError::Closed)));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().nth(1).unwrap().contains("DEAD"));
    }
}
