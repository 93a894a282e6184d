//! Thread boundary between the bus thread (backend) and the consumer.
//!
//! A dispatch channel is a FIFO with one producer and one consumer. It is
//! the only thing the two threads share: frames and error events go one
//! way, outbound frames go the other way on a second, independent channel.
//!
//! The producer side never blocks. The queue is unbounded; crossing
//! [`HIGH_WATER_MARK`] only logs a warning so a stalled consumer shows up in
//! the diagnostics instead of silently eating memory.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Backlog size that triggers a warning
pub const HIGH_WATER_MARK: usize = 100_000;

/// Create a connected producer/consumer pair
pub fn dispatch_channel<T>() -> (DispatchSender<T>, DispatchReceiver<T>) {
    let (tx, rx) = unbounded();
    (
        DispatchSender {
            tx,
            over_high_water: AtomicBool::new(false),
        },
        DispatchReceiver { rx },
    )
}

/// Producer half
#[derive(Debug)]
pub struct DispatchSender<T> {
    tx: Sender<T>,
    over_high_water: AtomicBool,
}

impl<T> DispatchSender<T> {
    /// Queue a message without blocking
    ///
    /// Returns `false` if the consumer has gone away.
    pub fn push(&self, msg: T) -> bool {
        if self.tx.send(msg).is_err() {
            return false;
        }

        let backlog = self.tx.len();
        if backlog >= HIGH_WATER_MARK {
            if !self.over_high_water.swap(true, Ordering::Relaxed) {
                tracing::warn!("Dispatch backlog reached {} messages", backlog);
            }
        } else if backlog < HIGH_WATER_MARK / 2 {
            self.over_high_water.store(false, Ordering::Relaxed);
        }
        true
    }

    /// Number of queued messages
    pub fn backlog(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer half
#[derive(Debug)]
pub struct DispatchReceiver<T> {
    rx: Receiver<T>,
}

impl<T> DispatchReceiver<T> {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Like [`try_recv`](Self::try_recv) but distinguishes an empty queue from a closed one
    pub fn poll(&self) -> Result<Option<T>, Disconnected> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Disconnected),
        }
    }

    /// Wait up to `timeout` for a message
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, Disconnected> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Disconnected),
        }
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Receive pending messages, waiting until `deadline` for the first one
    ///
    /// At most `limit` messages are returned so the caller gets control back
    /// under sustained load.
    pub fn drain_until(&self, deadline: Instant, limit: usize) -> Vec<T> {
        let mut out = Vec::new();
        if limit == 0 {
            return out;
        }
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(wait) {
            Ok(msg) => out.push(msg),
            Err(_) => return out,
        }
        out.extend(self.rx.try_iter().take(limit - 1));
        out
    }

    /// Number of queued messages
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}

/// The other half of a dispatch channel was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_after_receiver_dropped() {
        let (tx, rx) = dispatch_channel::<u32>();
        assert!(tx.push(1));
        drop(rx);
        assert!(!tx.push(2));
    }

    #[test]
    fn test_poll_reports_disconnect() {
        let (tx, rx) = dispatch_channel::<u32>();
        assert_eq!(rx.poll(), Ok(None));
        tx.push(7);
        drop(tx);
        assert_eq!(rx.poll(), Ok(Some(7)));
        assert_eq!(rx.poll(), Err(Disconnected));
    }

    #[test]
    fn test_drain_until_times_out_when_empty() {
        let (_tx, rx) = dispatch_channel::<u32>();
        let start = Instant::now();
        let got = rx.drain_until(start + Duration::from_millis(20), 10);
        assert!(got.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_drain_until_respects_limit() {
        let (tx, rx) = dispatch_channel::<u32>();
        for i in 0..10 {
            tx.push(i);
        }
        let got = rx.drain_until(Instant::now(), 4);
        assert_eq!(got, vec![0, 1, 2, 3]);
        assert_eq!(rx.backlog(), 6);
    }

    #[test]
    fn test_cross_thread_order() {
        let (tx, rx) = dispatch_channel::<u64>();
        let producer = std::thread::spawn(move || {
            for i in 0..10_000u64 {
                tx.push(i);
            }
        });
        let mut received = Vec::new();
        while received.len() < 10_000 {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(Some(v)) => received.push(v),
                Ok(None) => panic!("producer stalled"),
                Err(Disconnected) => break,
            }
        }
        producer.join().unwrap();
        assert_eq!(received, (0..10_000u64).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn test_fifo_no_loss_no_duplication(values in prop::collection::vec(any::<u32>(), 0..500)) {
            let (tx, rx) = dispatch_channel::<u32>();
            for v in &values {
                prop_assert!(tx.push(*v));
            }
            prop_assert_eq!(rx.drain(), values);
        }
    }
}
