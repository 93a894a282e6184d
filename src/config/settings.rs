//! Session settings surface
//!
//! The connection parameters a user can edit between sessions. A session
//! captures its own copy of the [`ConnectionConfig`] when it starts, so
//! edits are only accepted while the connection is down.

use super::{Bitrate, BusInterface, ConnectionConfig};
use crate::error::{CanVisError, Result};
use crate::types::ConnectionState;

/// Editable connection settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    connection: ConnectionConfig,
}

impl SessionSettings {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self { connection }
    }

    /// Settings the next session will use
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Replace the settings after validating them
    ///
    /// Fails unless the connection is `Disconnected`.
    pub fn apply(&mut self, new: ConnectionConfig, state: ConnectionState) -> Result<()> {
        if state != ConnectionState::Disconnected {
            return Err(CanVisError::Config(
                "Please disconnect before changing settings.".to_string(),
            ));
        }
        new.validate()?;
        tracing::info!("New settings: {}", new.describe());
        self.connection = new;
        Ok(())
    }

    /// Convenience for the settings form: raw values in, validated config applied
    pub fn apply_fields(
        &mut self,
        interface: &str,
        channel: &str,
        bitrate_bps: u32,
        state: ConnectionState,
    ) -> Result<()> {
        let new = ConnectionConfig::new(
            interface.parse::<BusInterface>()?,
            channel.trim(),
            Bitrate::new(bitrate_bps)?,
        );
        self.apply(new, state)
    }

    /// Status line shown after settings change, e.g. `Ready (can0 @ 500 kbps)`
    pub fn ready_message(&self) -> String {
        format!(
            "Ready ({} @ {} kbps)",
            self.connection.channel,
            self.connection.bitrate.kbps()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_while_disconnected() {
        let mut settings = SessionSettings::default();
        settings
            .apply_fields("virtual", "test0", 250_000, ConnectionState::Disconnected)
            .unwrap();
        assert_eq!(settings.connection().interface, BusInterface::Virtual);
        assert_eq!(settings.connection().channel, "test0");
        assert_eq!(settings.ready_message(), "Ready (test0 @ 250 kbps)");
    }

    #[test]
    fn test_apply_rejected_while_active() {
        let mut settings = SessionSettings::default();
        let before = settings.clone();
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
        ] {
            let result = settings.apply(ConnectionConfig::virtual_bus("x"), state);
            assert!(result.is_err());
        }
        assert_eq!(settings, before);
    }

    #[test]
    fn test_apply_rejects_invalid_fields() {
        let mut settings = SessionSettings::default();
        let state = ConnectionState::Disconnected;
        assert!(settings.apply_fields("virtual", "x", 12_345, state).is_err());
        assert!(settings.apply_fields("nope", "x", 500_000, state).is_err());
        assert!(settings.apply_fields("virtual", "", 500_000, state).is_err());
    }
}
