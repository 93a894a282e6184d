//! Core data types for CanVis-RS
//!
//! This module contains the fundamental data structures used throughout
//! the application for representing bus traffic and session state.
//!
//! # Main Types
//!
//! - [`CanFrame`] - One unit of bus traffic (data, remote, error or FD frame)
//! - [`FrameKind`] - Classification of a frame used for display and logging
//! - [`ConnectionState`] - Lifecycle state of the bus connection
//! - [`SessionStats`] - Consumer-side counters for the active session
//!
//! # Invariants
//!
//! A valid frame satisfies:
//! - `data.len() == dlc` for data and FD frames
//! - `dlc <= 8` unless `is_fd`, and `dlc <= 64` for FD frames
//! - remote frames carry no data bytes
//! - standard ids fit in 11 bits, extended ids in 29 bits
//!
//! Frames are plain values: they move by value across the dispatch channel
//! and are never mutated after construction.

use crate::error::{CanVisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Largest standard (11-bit) identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest extended (29-bit) identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Maximum payload of a classic CAN frame
pub const MAX_CLASSIC_DLC: u8 = 8;

/// Maximum payload of a CAN FD frame
pub const MAX_FD_DLC: u8 = 64;

/// Payload lengths a CAN FD frame may carry
const FD_LENGTHS: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// A single frame observed on (or destined for) the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanFrame {
    pub arbitration_id: u32,
    pub is_extended_id: bool,
    pub is_remote_frame: bool,
    pub is_error_frame: bool,
    pub is_fd: bool,
    pub bitrate_switch: bool,
    pub dlc: u8,
    pub data: Vec<u8>,
    /// Seconds, either monotonic or since the Unix epoch depending on the adapter
    pub timestamp: f64,
    /// Channel the frame was received on; empty if the adapter does not say
    pub channel_label: String,
}

impl Default for CanFrame {
    fn default() -> Self {
        Self {
            arbitration_id: 0,
            is_extended_id: false,
            is_remote_frame: false,
            is_error_frame: false,
            is_fd: false,
            bitrate_switch: false,
            dlc: 0,
            data: Vec::new(),
            timestamp: 0.0,
            channel_label: String::new(),
        }
    }
}

impl CanFrame {
    /// Create a classic data frame
    ///
    /// The id is treated as extended if it does not fit in 11 bits.
    pub fn data_frame(arbitration_id: u32, data: &[u8]) -> Result<Self> {
        let frame = Self {
            arbitration_id,
            is_extended_id: arbitration_id > MAX_STANDARD_ID,
            dlc: u8::try_from(data.len()).unwrap_or(u8::MAX),
            data: data.to_vec(),
            ..Self::default()
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Create a remote transmission request
    pub fn remote_frame(arbitration_id: u32, dlc: u8) -> Result<Self> {
        let frame = Self {
            arbitration_id,
            is_extended_id: arbitration_id > MAX_STANDARD_ID,
            is_remote_frame: true,
            dlc,
            ..Self::default()
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Create a CAN FD data frame
    pub fn fd_frame(arbitration_id: u32, data: &[u8], bitrate_switch: bool) -> Result<Self> {
        let frame = Self {
            arbitration_id,
            is_extended_id: arbitration_id > MAX_STANDARD_ID,
            is_fd: true,
            bitrate_switch,
            dlc: u8::try_from(data.len()).unwrap_or(u8::MAX),
            data: data.to_vec(),
            ..Self::default()
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Create an error frame carrying the controller's error bytes
    pub fn error_frame(data: &[u8]) -> Self {
        let len = data.len().min(MAX_CLASSIC_DLC as usize);
        Self {
            is_error_frame: true,
            dlc: len as u8,
            data: data[..len].to_vec(),
            ..Self::default()
        }
    }

    /// Force the id format (standard vs extended)
    pub fn with_extended_id(mut self, extended: bool) -> Self {
        self.is_extended_id = extended;
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel_label = channel.into();
        self
    }

    /// Check the data model invariants
    pub fn validate(&self) -> Result<()> {
        let max_id = if self.is_extended_id {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if self.arbitration_id > max_id {
            return Err(CanVisError::InvalidFrame(format!(
                "id 0x{:X} does not fit a {} identifier",
                self.arbitration_id,
                if self.is_extended_id { "29-bit" } else { "11-bit" }
            )));
        }

        if self.is_fd {
            if self.is_remote_frame {
                return Err(CanVisError::InvalidFrame(
                    "CAN FD has no remote frames".to_string(),
                ));
            }
            if !FD_LENGTHS.contains(&self.dlc) {
                return Err(CanVisError::InvalidFrame(format!(
                    "{} is not a valid CAN FD length",
                    self.dlc
                )));
            }
        } else {
            if self.bitrate_switch {
                return Err(CanVisError::InvalidFrame(
                    "bitrate switch requires a CAN FD frame".to_string(),
                ));
            }
            if self.dlc > MAX_CLASSIC_DLC {
                return Err(CanVisError::InvalidFrame(format!(
                    "dlc {} exceeds {} bytes for classic CAN",
                    self.dlc, MAX_CLASSIC_DLC
                )));
            }
        }

        if self.is_remote_frame {
            if !self.data.is_empty() {
                return Err(CanVisError::InvalidFrame(
                    "remote frames carry no data".to_string(),
                ));
            }
        } else if !self.is_error_frame && self.data.len() != self.dlc as usize {
            return Err(CanVisError::InvalidFrame(format!(
                "dlc {} does not match {} data bytes",
                self.dlc,
                self.data.len()
            )));
        }

        Ok(())
    }

    /// Build a frame from the text a user typed into a send form
    ///
    /// `id_text` is hex with an optional `(Ext)`/`(Std)` marker; `data_text`
    /// is whitespace-separated hex bytes (pairs may also be run together).
    /// Remote requests ignore `data_text` and use dlc 0.
    pub fn from_send_request(id_text: &str, data_text: &str, remote: bool) -> Result<Self> {
        let explicit_ext = id_text.contains("(Ext)");
        let explicit_std = id_text.contains("(Std)");
        let id_clean = id_text.replace("(Ext)", "").replace("(Std)", "");
        let id_clean = id_clean.trim().trim_start_matches("0x").trim_start_matches("0X");
        let arbitration_id = u32::from_str_radix(id_clean, 16).map_err(|e| {
            CanVisError::InvalidFrame(format!("invalid id '{}': {}", id_text.trim(), e))
        })?;

        let frame = if remote {
            Self::remote_frame(arbitration_id, 0)?
        } else {
            let bytes = parse_hex_bytes(data_text)?;
            if bytes.len() > MAX_CLASSIC_DLC as usize {
                return Err(CanVisError::InvalidFrame(
                    "Data length exceeds 8 bytes for standard CAN.".to_string(),
                ));
            }
            Self::data_frame(arbitration_id, &bytes)?
        };

        let extended = if explicit_ext {
            true
        } else if explicit_std {
            false
        } else {
            frame.is_extended_id
        };
        let frame = frame.with_extended_id(extended);
        frame.validate()?;
        Ok(frame)
    }

    /// Classify the frame
    pub fn kind(&self) -> FrameKind {
        if self.is_remote_frame {
            FrameKind::Remote
        } else if self.is_error_frame {
            FrameKind::Error
        } else if self.is_fd {
            FrameKind::Fd {
                bitrate_switch: self.bitrate_switch,
            }
        } else {
            FrameKind::Data
        }
    }

    /// Whether this frame carries payload bytes that can be sampled
    pub fn is_data_frame(&self) -> bool {
        !self.is_remote_frame && !self.is_error_frame
    }

    /// Id in upper-case hex, no prefix
    pub fn id_hex(&self) -> String {
        format!("{:X}", self.arbitration_id)
    }

    /// Payload as upper-case hex with the given separator between bytes
    pub fn data_hex(&self, separator: &str) -> String {
        hex_upper(&self.data, separator)
    }
}

/// Frame classification used in the display and log columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Remote,
    Error,
    Fd { bitrate_switch: bool },
}

impl FrameKind {
    pub fn label(&self) -> &'static str {
        match self {
            FrameKind::Data => "Data",
            FrameKind::Remote => "Remote",
            FrameKind::Error => "Error",
            FrameKind::Fd {
                bitrate_switch: false,
            } => "FD",
            FrameKind::Fd {
                bitrate_switch: true,
            } => "FD BRS",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Format bytes as upper-case hex pairs
pub fn hex_upper(bytes: &[u8], separator: &str) -> String {
    let mut out = String::with_capacity(bytes.len() * (2 + separator.len()));
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Parse hex bytes such as `"00 11 22"` or `"001122"`
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.split_whitespace().collect();
    if !digits.is_ascii() {
        return Err(CanVisError::InvalidFrame(format!(
            "non-hex characters in '{}'",
            text.trim()
        )));
    }
    if digits.len() % 2 != 0 {
        return Err(CanVisError::InvalidFrame(format!(
            "odd number of hex digits in '{}'",
            text.trim()
        )));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|e| {
                CanVisError::InvalidFrame(format!("invalid hex byte '{}': {}", &digits[i..i + 2], e))
            })
        })
        .collect()
}

/// Represents the lifecycle of the bus connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No bus thread exists
    #[default]
    Disconnected,
    /// Bus thread started, adapter not yet confirmed open
    Connecting,
    /// Adapter open and frames flowing
    Connected,
    /// Stop requested, waiting for the bus thread to exit
    Disconnecting,
}

impl ConnectionState {
    /// Whether a bus thread currently exists
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnecting => write!(f, "Disconnecting..."),
        }
    }
}

/// Statistics about the current session, kept on the consumer side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames routed to the display
    pub frames_received: u64,
    /// Frames the transport accepted for transmission
    pub frames_sent: u64,
    /// Error events surfaced
    pub errors: u64,
    /// CSV rows successfully written
    pub log_rows_written: u64,
    /// CSV rows that failed to write
    pub log_write_failures: u64,
}
