//! Hand-written bus adapters for integration tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use canvis_rs::backend::{BusAdapter, BusFactory};
use canvis_rs::config::ConnectionConfig;
use canvis_rs::error::AdapterError;
use canvis_rs::types::CanFrame;

/// Adapter whose `recv` ignores its timeout and blocks until released
///
/// Gives up after `max_block` so an abandoned thread does not outlive the
/// test binary by much.
pub struct StuckBus {
    release: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
    max_block: Duration,
}

impl BusAdapter for StuckBus {
    fn channel_info(&self) -> String {
        "stuck bus".to_string()
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, AdapterError> {
        if self.release.load(Ordering::SeqCst) {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        let until = Instant::now() + self.max_block;
        while !self.release.load(Ordering::SeqCst) && Instant::now() < until {
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(None)
    }

    fn send(&mut self, _frame: &CanFrame) -> Result<(), AdapterError> {
        Ok(())
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out [`StuckBus`] adapters
///
/// Returns the factory, the release flag and the close counter.
pub fn stuck_factory(max_block: Duration) -> (Arc<dyn BusFactory>, Arc<AtomicBool>, Arc<AtomicUsize>) {
    let release = Arc::new(AtomicBool::new(false));
    let closes = Arc::new(AtomicUsize::new(0));
    let (r, c) = (Arc::clone(&release), Arc::clone(&closes));
    let factory = move |_: &ConnectionConfig| -> Result<Box<dyn BusAdapter>, AdapterError> {
        Ok(Box::new(StuckBus {
            release: Arc::clone(&r),
            closes: Arc::clone(&c),
            max_block,
        }) as Box<dyn BusAdapter>)
    };
    (Arc::new(factory), release, closes)
}

/// Adapter that records what it is asked to send and never receives
pub struct RecordingBus {
    sent: Arc<Mutex<Vec<CanFrame>>>,
}

impl BusAdapter for RecordingBus {
    fn channel_info(&self) -> String {
        "recording bus".to_string()
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, AdapterError> {
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), AdapterError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(frame.clone());
        }
        Ok(())
    }

    fn close(&mut self) {}
}

/// Factory handing out [`RecordingBus`] adapters that share one record
pub fn recording_factory() -> (Arc<dyn BusFactory>, Arc<Mutex<Vec<CanFrame>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&sent);
    let factory = move |_: &ConnectionConfig| -> Result<Box<dyn BusAdapter>, AdapterError> {
        Ok(Box::new(RecordingBus {
            sent: Arc::clone(&s),
        }) as Box<dyn BusAdapter>)
    };
    (Arc::new(factory), sent)
}
