//! Application module
//!
//! [`AnalyzerApp`] is the consumer context. It owns the connection manager,
//! the current session's router, the CSV log, the status surface and the
//! plot refresh timer, and it is the only place any of them are mutated.
//!
//! A frontend drives it by calling [`AnalyzerApp::tick`] from its event
//! loop; each tick drains the dispatch channel for at most one plot refresh
//! interval, routes what arrived, and redraws the plot when due.
//!
//! # Example
//!
//! ```ignore
//! use canvis_rs::app::AnalyzerApp;
//! use canvis_rs::frontend::{ConsoleDisplay, NullPlotView};
//!
//! let mut app = AnalyzerApp::new(config, factory, ConsoleDisplay::new(), NullPlotView);
//! app.connect()?;
//! while running {
//!     app.tick(Duration::from_millis(100));
//! }
//! app.shutdown();
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{BusFactory, ConnectionManager, SessionEvent};
use crate::config::{AppConfig, ConnectionConfig, SessionSettings};
use crate::error::{CanVisError, ConnectError, ErrorEvent, Result, ResultExt, SendError};
use crate::frontend::{refresh, FrameDisplay, PlotRefreshTimer, PlotView, StatusBar};
use crate::pipeline::{MessageRouter, PlotBuffer};
use crate::session::LogWriter;
use crate::types::{CanFrame, ConnectionState, SessionStats};

/// The consumer side of the analyzer
pub struct AnalyzerApp<D: FrameDisplay, P: PlotView> {
    config: AppConfig,
    settings: SessionSettings,
    manager: ConnectionManager,
    /// Router of the current session; rebuilt on every connect
    session: Option<MessageRouter>,
    /// Config the current session was started with
    session_config: Option<ConnectionConfig>,
    log: Option<LogWriter>,
    display: D,
    plot_view: P,
    status: StatusBar,
    plot_timer: PlotRefreshTimer,
    stats: SessionStats,
    shut_down: bool,
}

impl<D: FrameDisplay, P: PlotView> AnalyzerApp<D, P> {
    pub fn new(config: AppConfig, factory: Arc<dyn BusFactory>, display: D, plot_view: P) -> Self {
        let manager = ConnectionManager::new(factory, config.shutdown.clone());
        Self {
            settings: SessionSettings::new(config.connection.clone()),
            status: StatusBar::new(Duration::from_millis(config.status.error_display_ms)),
            plot_timer: PlotRefreshTimer::new(config.plot.refresh_interval()),
            config,
            manager,
            session: None,
            session_config: None,
            log: None,
            display,
            plot_view,
            stats: SessionStats::default(),
            shut_down: false,
        }
    }

    // ==================== Connection ====================

    /// Connect with the current settings
    pub fn connect(&mut self) -> std::result::Result<(), ConnectError> {
        let config = self.settings.connection().clone();
        let result = self.manager.connect(&config);
        if result.is_ok() {
            self.session = Some(MessageRouter::new(&self.config.plot, config.channel.clone()));
            self.session_config = Some(config);
            self.stats = SessionStats::default();
            self.plot_view.clear();
            self.plot_timer.start(Instant::now());
        }
        let events = self.manager.poll(Duration::ZERO);
        self.process(events);
        result
    }

    /// Disconnect and wait for the bus thread
    pub fn disconnect(&mut self) {
        self.manager.disconnect();
        let events = self.manager.poll(Duration::ZERO);
        self.process(events);
    }

    /// Run one consumer step; returns the number of frames routed
    ///
    /// Blocks for at most `max_wait`, and never longer than one plot refresh
    /// interval.
    pub fn tick(&mut self, max_wait: Duration) -> usize {
        let wait = max_wait.min(self.plot_timer.interval());
        let events = self.manager.poll(wait);
        let frames = self.process(events);

        if self.plot_timer.due(Instant::now()) {
            if let Some(router) = &self.session {
                refresh(router.plot(), &mut self.plot_view);
            }
        }
        frames
    }

    fn process(&mut self, events: Vec<SessionEvent>) -> usize {
        let mut frames = 0;
        for event in events {
            match event {
                SessionEvent::StateChanged(state) => self.on_state_changed(state),
                SessionEvent::Frame(frame) => {
                    self.route(&frame);
                    frames += 1;
                }
                SessionEvent::Sent(frame) => {
                    tracing::trace!("Frame {} on the bus", frame.id_hex());
                    self.stats.frames_sent += 1;
                }
                SessionEvent::Error(e) => self.report_error(e),
            }
        }
        frames
    }

    fn route(&mut self, frame: &CanFrame) {
        let Some(router) = self.session.as_mut() else {
            tracing::debug!("Frame {} arrived with no session", frame.id_hex());
            return;
        };
        let outcome = router.route(frame, &mut self.display, self.log.as_mut());
        self.stats.frames_received += 1;
        if outcome.logged {
            self.stats.log_rows_written += 1;
        }
        if let Some(e) = outcome.log_error {
            self.stats.log_write_failures += 1;
            self.report_error(ErrorEvent::LogWrite(e.to_string()));
        }
    }

    fn on_state_changed(&mut self, state: ConnectionState) {
        self.status.set_state(state, self.session_config.as_ref());
        self.display.show_status(self.status.state_line());
        if state == ConnectionState::Disconnected {
            self.end_session();
        }
    }

    fn end_session(&mut self) {
        self.stop_logging();
        self.plot_timer.stop();
        if let Some(router) = self.session.take() {
            tracing::info!(
                "Session ended after {} frames ({} sent, {} errors)",
                router.sequence(),
                self.stats.frames_sent,
                self.stats.errors
            );
        }
        self.session_config = None;
    }

    fn report_error(&mut self, event: ErrorEvent) {
        tracing::debug!("Reporting error: {}", event);
        self.stats.errors += 1;
        let now = Instant::now();
        let message = self.status.post_error(&event, now);
        self.display
            .show_error(&message.text, message.remaining(now));
    }

    // ==================== Sending ====================

    /// Queue a frame on the current session
    ///
    /// `frames_sent` counts the frame once the bus thread confirms it;
    /// transport rejections arrive later as send errors.
    pub fn send_frame(&mut self, frame: CanFrame) -> std::result::Result<(), SendError> {
        self.manager.send(frame).map_err(|e| {
            self.report_error(ErrorEvent::Send(e.clone()));
            e
        })
    }

    /// Parse a send form and send the result
    ///
    /// See [`CanFrame::from_send_request`] for the accepted formats.
    pub fn send_request(&mut self, id_text: &str, data_text: &str, remote: bool) -> Result<()> {
        let frame = match CanFrame::from_send_request(id_text, data_text, remote) {
            Ok(frame) => frame,
            Err(e) => {
                self.report_error(ErrorEvent::Send(SendError::InvalidFrame(e.to_string())));
                return Err(e);
            }
        };
        self.send_frame(frame)?;
        Ok(())
    }

    // ==================== Logging ====================

    /// Start writing received frames to a CSV file
    ///
    /// With no path, a timestamped file in the configured log directory is
    /// used. Fails if logging is already active.
    pub fn start_logging(&mut self, path: Option<&Path>) -> Result<PathBuf> {
        if self.log.is_some() {
            return Err(CanVisError::Config("Logging is already active".to_string()));
        }
        let path = match path {
            Some(p) => self.config.logging.resolve_path(p),
            None => self.config.logging.default_log_path(),
        };
        let writer = LogWriter::create(&path)
            .with_context(|| format!("Could not open log file {}", path.display()))?;

        let message = format!("Logging started: {}", writer.file_name());
        self.status.post_info(message.as_str());
        self.display.show_status(&message);
        self.log = Some(writer);
        Ok(path)
    }

    /// Stop logging; returns the path of the closed file, if any
    pub fn stop_logging(&mut self) -> Option<PathBuf> {
        let mut writer = self.log.take()?;
        writer.close();
        let message = format!("Logging stopped: {}", writer.file_name());
        self.status.post_info(message.as_str());
        self.display.show_status(&message);
        Some(writer.path().to_path_buf())
    }

    pub fn is_logging(&self) -> bool {
        self.log.is_some()
    }

    // ==================== Settings ====================

    /// Replace the connection settings; only allowed while disconnected
    pub fn configure(&mut self, connection: ConnectionConfig) -> Result<()> {
        self.settings.apply(connection, self.manager.state())?;
        self.config.connection = self.settings.connection().clone();
        self.status.set_state_line(self.settings.ready_message());
        self.display.show_status(self.status.state_line());
        Ok(())
    }

    /// Dismiss the current status message
    pub fn acknowledge_status(&mut self) {
        self.status.acknowledge();
    }

    // ==================== Exit ====================

    /// Stop logging and disconnect; safe to call more than once
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        tracing::info!("Shutting down...");
        self.stop_logging();
        if self.manager.state().is_active() {
            self.disconnect();
        }
        self.shut_down = true;
    }

    // ==================== Accessors ====================

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Plot history of the current session
    pub fn plot_buffer(&self) -> Option<&PlotBuffer> {
        self.session.as_ref().map(MessageRouter::plot)
    }

    /// Frames routed in the current session
    pub fn sequence(&self) -> u64 {
        self.session.as_ref().map(MessageRouter::sequence).unwrap_or(0)
    }

    /// Text the status surface shows right now
    pub fn status_text(&mut self) -> String {
        self.status.text(Instant::now())
    }

    pub fn status(&mut self) -> &mut StatusBar {
        &mut self.status
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn plot_view(&self) -> &P {
        &self.plot_view
    }
}

impl<D: FrameDisplay, P: PlotView> Drop for AnalyzerApp<D, P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
