//! Ingestion Worker Thread Implementation
//!
//! This module contains the read loop that runs on a dedicated thread, one
//! per session. It owns the [`BusAdapter`] exclusively and talks to the
//! consumer only through channels.
//!
//! # Responsibilities
//!
//! - **Open**: opens the adapter on the worker thread and reports the result
//! - **Ingestion**: polls the adapter and forwards each frame as a [`WorkerEvent::Frame`]
//! - **Outbound**: drains [`WorkerCommand::Send`] between reads
//! - **Error handling**: converts adapter failures into events, never panics across the boundary
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──open ok──► Running ──stop──────────► exit
//!    │                     │
//!    └──open failed──► Faulted ◄──fatal read error
//!                          │
//!                          └──stop──► exit
//! ```
//!
//! Transient read errors are reported and reading continues. The adapter is
//! closed as soon as the read loop ends, whatever the reason.
//! A faulted worker keeps answering send requests with `NotConnected` until
//! it is told to stop. Every read blocks for at most the poll interval, so a
//! stop request is observed within one interval even on a silent bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::bus_trait::{BusAdapter, BusFactory};
use super::{WorkerCommand, WorkerEvent};
use crate::config::{ConnectionConfig, MAX_POLL_INTERVAL_MS};
use crate::error::{ConnectError, SendError};
use crate::pipeline::bridge::{dispatch_channel, DispatchReceiver, DispatchSender};
use crate::types::CanFrame;

/// Worker thread phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerPhase {
    Starting,
    Running,
    Faulted,
}

/// Entry point for starting a bus thread
pub struct IngestionWorker;

impl IngestionWorker {
    /// Spawn a worker for `config`
    ///
    /// Returns as soon as the thread is running; whether the adapter opened
    /// is reported later as [`WorkerEvent::Opened`] or
    /// [`WorkerEvent::OpenFailed`] on the returned receiver.
    pub fn start(
        config: &ConnectionConfig,
        factory: Arc<dyn BusFactory>,
        poll_interval: Duration,
    ) -> Result<(WorkerHandle, DispatchReceiver<WorkerEvent>), ConnectError> {
        config
            .validate()
            .map_err(|e| ConnectError::InvalidConfig(e.to_string()))?;

        let poll_interval =
            poll_interval.clamp(Duration::from_millis(1), Duration::from_millis(MAX_POLL_INTERVAL_MS));
        let stop = Arc::new(AtomicBool::new(false));
        let reading = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = dispatch_channel();
        let (command_tx, command_rx) = unbounded();
        let (exited_tx, exited_rx) = bounded(1);

        let worker = WorkerLoop {
            config: config.clone(),
            factory,
            events: event_tx,
            commands: command_rx,
            stop: Arc::clone(&stop),
            reading: Arc::clone(&reading),
            poll_interval,
            phase: WorkerPhase::Starting,
        };

        let thread = std::thread::Builder::new()
            .name("canvis-bus".to_string())
            .spawn(move || {
                let _exit = ExitSignal(exited_tx);
                worker.run();
            })
            .map_err(|e| ConnectError::Spawn(e.to_string()))?;

        tracing::debug!("Bus thread spawned for {}", config.describe());

        Ok((
            WorkerHandle {
                stop,
                reading,
                commands: command_tx,
                exited: exited_rx,
                thread: Some(thread),
                channel: config.channel.clone(),
            },
            event_rx,
        ))
    }
}

/// Signals the exit channel when the worker thread unwinds or returns
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Closes the adapter on every exit path
struct AdapterGuard {
    adapter: Box<dyn BusAdapter>,
}

impl Drop for AdapterGuard {
    fn drop(&mut self) {
        self.adapter.close();
        tracing::info!("Bus adapter closed: {}", self.adapter.channel_info());
    }
}

/// State owned by the worker thread
struct WorkerLoop {
    config: ConnectionConfig,
    factory: Arc<dyn BusFactory>,
    events: DispatchSender<WorkerEvent>,
    commands: Receiver<WorkerCommand>,
    stop: Arc<AtomicBool>,
    reading: Arc<AtomicBool>,
    poll_interval: Duration,
    phase: WorkerPhase,
}

impl WorkerLoop {
    fn run(mut self) {
        tracing::info!("Bus worker started for {}", self.config.describe());

        match self.factory.open(&self.config) {
            Ok(adapter) => {
                let mut guard = AdapterGuard { adapter };
                let channel_info = guard.adapter.channel_info();
                tracing::info!("Bus adapter opened: {}", channel_info);
                self.phase = WorkerPhase::Running;
                self.reading.store(true, Ordering::SeqCst);
                self.emit(WorkerEvent::Opened { channel_info });
                self.read_loop(&mut guard);
                self.reading.store(false, Ordering::SeqCst);
                // guard drops here and closes the adapter
            }
            Err(e) => {
                tracing::error!("Failed to open bus {}: {}", self.config.describe(), e);
                self.phase = WorkerPhase::Faulted;
                self.emit(WorkerEvent::OpenFailed(e));
            }
        }

        if self.phase == WorkerPhase::Faulted {
            self.idle_until_stopped();
        }

        self.emit(WorkerEvent::Stopped);
        tracing::info!("Bus worker stopped");
    }

    fn read_loop(&mut self, guard: &mut AdapterGuard) {
        while !self.stop_requested() {
            self.process_commands(guard);
            if self.stop_requested() {
                break;
            }

            match guard.adapter.recv(self.poll_interval) {
                Ok(Some(frame)) => self.emit(WorkerEvent::Frame(frame)),
                Ok(None) => {}
                Err(e) if e.ends_session() => {
                    tracing::error!("Bus error: {}", e);
                    self.phase = WorkerPhase::Faulted;
                    self.emit(WorkerEvent::AdapterError(e));
                    break;
                }
                Err(e) => {
                    tracing::warn!("Transient bus error: {}", e);
                    self.emit(WorkerEvent::AdapterError(e));
                    // A transport stuck in an error state returns at once; don't spin
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
    }

    /// Send any queued outbound frames
    fn process_commands(&mut self, guard: &mut AdapterGuard) {
        loop {
            match self.commands.try_recv() {
                Ok(WorkerCommand::Send(frame)) => {
                    if let Err(e) = guard.adapter.send(&frame) {
                        tracing::warn!("Failed to send frame {}: {}", frame.id_hex(), e);
                        self.emit(WorkerEvent::SendFailed {
                            frame,
                            error: SendError::Transport(e.message),
                        });
                    } else {
                        tracing::trace!("Sent frame {}", frame.id_hex());
                        self.emit(WorkerEvent::Sent(frame));
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.stop.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    /// After a fault: reject sends until told to stop
    fn idle_until_stopped(&mut self) {
        while !self.stop_requested() {
            match self.commands.recv_timeout(self.poll_interval) {
                Ok(WorkerCommand::Send(frame)) => self.emit(WorkerEvent::SendFailed {
                    frame,
                    error: SendError::NotConnected,
                }),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn emit(&self, event: WorkerEvent) {
        if !self.events.push(event) {
            // Consumer is gone; nothing left to read for
            self.stop.store(true, Ordering::SeqCst);
        }
    }
}

/// Consumer-side handle to a running worker
///
/// Dropping the handle asks the worker to stop but does not wait for it.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    reading: Arc<AtomicBool>,
    commands: Sender<WorkerCommand>,
    exited: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    channel: String,
}

impl WorkerHandle {
    /// Ask the worker to stop; returns immediately
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Queue a frame for transmission
    ///
    /// Fails with `NotConnected` unless the worker is in its read loop.
    /// Transport failures are reported later as [`WorkerEvent::SendFailed`].
    pub fn send(&self, frame: CanFrame) -> Result<(), SendError> {
        frame
            .validate()
            .map_err(|e| SendError::InvalidFrame(e.to_string()))?;
        if !self.is_reading() || self.stop.load(Ordering::SeqCst) {
            return Err(SendError::NotConnected);
        }
        self.commands
            .send(WorkerCommand::Send(frame))
            .map_err(|_| SendError::NotConnected)
    }

    /// Whether the worker is in its read loop
    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::SeqCst)
    }

    /// Whether the thread has exited (or was already joined)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }

    /// Wait up to `timeout` for the thread to exit, joining it if it did
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        tracing::error!("Bus thread for '{}' panicked", self.channel);
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Detach a thread that did not stop in time
    ///
    /// The stop flag stays set, so if the thread ever returns from its
    /// blocking call it exits and closes its adapter.
    pub fn abandon(mut self) {
        self.stop();
        if self.thread.take().is_some() {
            tracing::warn!(
                "Bus thread for '{}' detached while still running; adapter state may leak",
                self.channel
            );
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
