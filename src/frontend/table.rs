//! Receive-table row formatting

use crate::types::CanFrame;

/// Column titles, in display order
pub const COLUMNS: [&str; 7] = ["Timestamp", "ID", "Type", "DLC", "Data", "Count", "Channel"];

/// One formatted row of the receive table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRow {
    pub timestamp: String,
    /// Hex id with an `(Ext)` or `(Std)` suffix
    pub id: String,
    pub kind: String,
    pub dlc: u8,
    /// Space-separated hex bytes, `N/A` for remote frames
    pub data: String,
    pub count: u64,
    pub bus: String,
}

impl FrameRow {
    pub fn from_frame(frame: &CanFrame, count: u64, fallback_channel: &str) -> Self {
        let id = format!(
            "{} ({})",
            frame.id_hex(),
            if frame.is_extended_id { "Ext" } else { "Std" }
        );
        let data = if frame.is_remote_frame {
            "N/A".to_string()
        } else if frame.is_error_frame {
            format!("Error Data: {}", frame.data_hex(""))
        } else {
            frame.data_hex(" ")
        };
        let bus = if frame.channel_label.is_empty() {
            fallback_channel.to_string()
        } else {
            frame.channel_label.clone()
        };

        Self {
            timestamp: format!("{:.6}", frame.timestamp),
            id,
            kind: frame.kind().label().to_string(),
            dlc: frame.dlc,
            data,
            count,
            bus,
        }
    }

    /// Cells in [`COLUMNS`] order
    pub fn cells(&self) -> [String; 7] {
        [
            self.timestamp.clone(),
            self.id.clone(),
            self.kind.clone(),
            self.dlc.to_string(),
            self.data.clone(),
            self.count.to_string(),
            self.bus.clone(),
        ]
    }
}

impl std::fmt::Display for FrameRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>16}  {:<16} {:<7} {:>2}  {:<24} {:>8}  {}",
            self.timestamp, self.id, self.kind, self.dlc, self.data, self.count, self.bus
        )
    }
}
