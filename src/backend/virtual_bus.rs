//! In-process virtual bus
//!
//! A [`VirtualHub`] connects any number of [`VirtualBus`] handles by channel
//! name. A frame sent on one handle is delivered to every *other* open
//! handle on the same channel, the way a loopback-free virtual CAN
//! interface behaves. Opening a channel never fails; the first open creates
//! it.
//!
//! Tests can inject adapter errors into every handle on a channel with
//! [`VirtualHub::fail_channel`], and [`TrafficGenerator`] produces synthetic
//! traffic for demos and benchmarks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::bus_trait::BusAdapter;
use crate::error::AdapterError;
use crate::types::CanFrame;

/// What a virtual handle can receive
#[derive(Debug, Clone)]
enum VirtualItem {
    Frame(CanFrame),
    Error(AdapterError),
}

type Members = HashMap<String, Vec<(u64, Sender<VirtualItem>)>>;

/// Shared registry of virtual channels
#[derive(Debug, Clone)]
pub struct VirtualHub {
    inner: Arc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    members: Mutex<Members>,
    next_id: AtomicU64,
    epoch: Instant,
}

impl Default for VirtualHub {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                members: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                epoch: Instant::now(),
            }),
        }
    }

    fn members(&self) -> MutexGuard<'_, Members> {
        // A panicking handle cannot leave the map half-updated
        self.inner
            .members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Join `channel`, creating it if needed
    pub fn open(&self, channel: &str) -> VirtualBus {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        self.members()
            .entry(channel.to_string())
            .or_default()
            .push((id, tx));
        tracing::debug!("Virtual bus handle {} joined '{}'", id, channel);
        VirtualBus {
            hub: self.clone(),
            channel: channel.to_string(),
            id,
            rx,
            open: true,
        }
    }

    /// Number of open handles on `channel`
    pub fn handle_count(&self, channel: &str) -> usize {
        self.members().get(channel).map(Vec::len).unwrap_or(0)
    }

    /// Deliver an error to every handle on `channel`
    pub fn fail_channel(&self, channel: &str, error: AdapterError) {
        if let Some(list) = self.members().get(channel) {
            for (_, tx) in list {
                let _ = tx.send(VirtualItem::Error(error.clone()));
            }
        }
    }

    /// Seconds since the hub was created
    fn now(&self) -> f64 {
        self.inner.epoch.elapsed().as_secs_f64()
    }

    fn broadcast(&self, channel: &str, from: u64, frame: &CanFrame) {
        if let Some(list) = self.members().get(channel) {
            for (id, tx) in list {
                if *id != from {
                    let _ = tx.send(VirtualItem::Frame(frame.clone()));
                }
            }
        }
    }

    fn leave(&self, channel: &str, id: u64) {
        let mut members = self.members();
        if let Some(list) = members.get_mut(channel) {
            list.retain(|(member, _)| *member != id);
            if list.is_empty() {
                members.remove(channel);
            }
        }
    }
}

/// One open handle on a virtual channel
#[derive(Debug)]
pub struct VirtualBus {
    hub: VirtualHub,
    channel: String,
    id: u64,
    rx: Receiver<VirtualItem>,
    open: bool,
}

impl VirtualBus {
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl BusAdapter for VirtualBus {
    fn channel_info(&self) -> String {
        format!("Virtual bus channel {}", self.channel)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, AdapterError> {
        if !self.open {
            return Err(AdapterError::closed());
        }
        match self.rx.recv_timeout(timeout) {
            Ok(VirtualItem::Frame(frame)) => Ok(Some(frame)),
            Ok(VirtualItem::Error(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(AdapterError::closed()),
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), AdapterError> {
        if !self.open {
            return Err(AdapterError::closed());
        }
        let mut frame = frame.clone();
        if frame.timestamp == 0.0 {
            frame.timestamp = self.hub.now();
        }
        if frame.channel_label.is_empty() {
            frame.channel_label = self.channel.clone();
        }
        self.hub.broadcast(&self.channel, self.id, &frame);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.hub.leave(&self.channel, self.id);
            tracing::debug!("Virtual bus handle {} left '{}'", self.id, self.channel);
        }
    }
}

impl Drop for VirtualBus {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background thread emitting synthetic frames onto a virtual channel
///
/// Cycles through a small set of ids, including the default plotted id, so
/// every column of the display and the plot have something to show.
pub struct TrafficGenerator {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<u64>>,
}

impl TrafficGenerator {
    /// Start sending one frame every `interval` on `channel`
    pub fn start(hub: &VirtualHub, channel: &str, interval: Duration) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let mut bus = hub.open(channel);

        let thread = std::thread::Builder::new()
            .name("canvis-traffic".to_string())
            .spawn(move || {
                let mut sent = 0u64;
                let mut tick = 0u32;
                while flag.load(Ordering::SeqCst) {
                    let frame = synthetic_frame(tick);
                    match bus.send(&frame) {
                        Ok(()) => sent += 1,
                        Err(e) => {
                            tracing::warn!("Traffic generator stopped: {}", e);
                            break;
                        }
                    }
                    tick = tick.wrapping_add(1);
                    std::thread::sleep(interval);
                }
                bus.close();
                sent
            })?;

        tracing::info!("Traffic generator started on '{}'", channel);
        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Stop the generator and return how many frames it sent
    pub fn stop(&mut self) -> u64 {
        self.running.store(false, Ordering::SeqCst);
        self.thread
            .take()
            .and_then(|t| t.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for TrafficGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn synthetic_frame(tick: u32) -> CanFrame {
    let phase = (tick % 64) as f64 / 64.0 * std::f64::consts::TAU;
    let level = (127.5 + 127.5 * phase.sin()).round() as u8;
    let counter = tick.to_le_bytes();
    // Every frame built here satisfies the length invariants
    let frame = match tick % 4 {
        0 => CanFrame::data_frame(0x18FF_03EF, &[level, counter[0], 0x00, 0xFF]),
        1 => CanFrame::data_frame(0x123, &counter),
        2 => CanFrame::fd_frame(0x456, &[level; 12], tick % 8 == 2),
        _ => CanFrame::remote_frame(0x7DF, 8),
    };
    frame.unwrap_or_else(|_| CanFrame::error_frame(&[]))
}
