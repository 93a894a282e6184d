//! Status surface: connection line plus one transient or sticky message.
//!
//! Errors show for a bounded time. Connect failures and shutdown timeouts
//! are sticky: they stay until acknowledged or until the next connection
//! state change.

use std::time::{Duration, Instant};

use crate::config::ConnectionConfig;
use crate::error::ErrorEvent;
use crate::types::ConnectionState;

/// A message shown over the connection line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
    pub sticky: bool,
    /// `None` for messages that stay until replaced
    pub expires_at: Option<Instant>,
}

impl StatusMessage {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }

    /// Remaining display time, `None` if unbounded
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|t| t.saturating_duration_since(now))
    }
}

#[derive(Debug, Clone)]
pub struct StatusBar {
    state_line: String,
    message: Option<StatusMessage>,
    error_display: Duration,
}

impl StatusBar {
    pub fn new(error_display: Duration) -> Self {
        Self {
            state_line: ConnectionState::Disconnected.to_string(),
            message: None,
            error_display,
        }
    }

    /// Update the connection line after a state change
    ///
    /// `config` is the session being opened or running, if any.
    pub fn set_state(&mut self, state: ConnectionState, config: Option<&ConnectionConfig>) {
        self.state_line = match (state, config) {
            (ConnectionState::Connecting, Some(c)) => format!("Connecting to {}...", c.describe()),
            (ConnectionState::Connected, Some(c)) => {
                format!("Connected to {} @ {} kbps", c.channel, c.bitrate.kbps())
            }
            (state, _) => state.to_string(),
        };
        if self.has_sticky() {
            self.message = None;
        }
    }

    /// Replace the connection line, e.g. with a `Ready (...)` line after reconfiguration
    pub fn set_state_line(&mut self, line: impl Into<String>) {
        self.state_line = line.into();
    }

    /// Show an error; returns the message as posted
    ///
    /// A pending sticky error is not overwritten by a transient one. The
    /// transient message is still returned so it can be shown elsewhere.
    pub fn post_error(&mut self, event: &ErrorEvent, now: Instant) -> StatusMessage {
        let sticky = event.is_sticky();
        let message = StatusMessage {
            text: format!("Error: {}", event),
            is_error: true,
            sticky,
            expires_at: if sticky {
                None
            } else {
                Some(now + self.error_display)
            },
        };
        if sticky || !self.has_sticky() {
            self.message = Some(message.clone());
        }
        message
    }

    /// Whether a sticky error is waiting to be acknowledged
    pub fn has_sticky(&self) -> bool {
        self.message.as_ref().is_some_and(|m| m.sticky)
    }

    /// Show an informational message until something replaces it
    ///
    /// A pending sticky error is not overwritten.
    pub fn post_info(&mut self, text: impl Into<String>) {
        if self.has_sticky() {
            return;
        }
        self.message = Some(StatusMessage {
            text: text.into(),
            is_error: false,
            sticky: false,
            expires_at: None,
        });
    }

    /// Dismiss the current message
    pub fn acknowledge(&mut self) {
        self.message = None;
    }

    /// Current message, dropping it first if it has expired
    pub fn message(&mut self, now: Instant) -> Option<&StatusMessage> {
        if self.message.as_ref().is_some_and(|m| m.is_expired(now)) {
            self.message = None;
        }
        self.message.as_ref()
    }

    pub fn state_line(&self) -> &str {
        &self.state_line
    }

    /// What the status surface shows right now
    pub fn text(&mut self, now: Instant) -> String {
        match self.message(now) {
            Some(m) => m.text.clone(),
            None => self.state_line.clone(),
        }
    }
}

impl Default for StatusBar {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_ERROR_DISPLAY_MS))
    }
}
