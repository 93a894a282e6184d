//! CSV frame log
//!
//! One file per logging session: a fixed header row followed by one row per
//! routed frame. Each row is flushed as soon as it is written so a crash or a
//! forced shutdown never leaves a half-written row behind. The file is closed
//! when logging stops, when the session disconnects, on application exit,
//! and as a last resort when the writer is dropped.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::LogWriteError;
use crate::types::{CanFrame, FrameKind};

/// Header row of every log file
pub const LOG_HEADER: &str = "Timestamp,ID (Hex),ID Type,Msg Type,DLC,Data (Hex),Count,Bus";

/// One row of the CSV log
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: f64,
    pub arbitration_id: u32,
    pub is_extended_id: bool,
    pub kind: FrameKind,
    pub dlc: u8,
    /// Upper-case hex, no separators; `N/A` for remote frames
    pub data: String,
    pub sequence: u64,
    pub bus: String,
}

impl LogRecord {
    /// Project a frame into a log row
    ///
    /// `fallback_bus` is used when the frame carries no channel label.
    pub fn from_frame(frame: &CanFrame, sequence: u64, fallback_bus: &str) -> Self {
        let data = if frame.is_remote_frame {
            "N/A".to_string()
        } else {
            frame.data_hex("")
        };
        let bus = if frame.channel_label.is_empty() {
            fallback_bus.to_string()
        } else {
            frame.channel_label.clone()
        };
        Self {
            timestamp: frame.timestamp,
            arbitration_id: frame.arbitration_id,
            is_extended_id: frame.is_extended_id,
            kind: frame.kind(),
            dlc: frame.dlc,
            data,
            sequence,
            bus,
        }
    }

    /// Render the row, without a line terminator
    pub fn to_csv_row(&self) -> String {
        format!(
            "{:.6},{:X},{},{},{},{},{},{}",
            self.timestamp,
            self.arbitration_id,
            if self.is_extended_id { "E" } else { "S" },
            self.kind.label(),
            self.dlc,
            self.data,
            self.sequence,
            csv_field(&self.bus)
        )
    }
}

/// Quote a field if it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Append-only CSV writer
#[derive(Debug)]
pub struct LogWriter {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    rows_written: u64,
}

impl LogWriter {
    /// Create (or truncate) the file and write the header row
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", LOG_HEADER)?;
        writer.flush()?;

        tracing::info!("Logging started: {}", path.display());
        Ok(Self {
            writer: Some(writer),
            path,
            rows_written: 0,
        })
    }

    /// Append one row and flush it
    pub fn write(&mut self, record: &LogRecord) -> Result<(), LogWriteError> {
        let writer = self.writer.as_mut().ok_or(LogWriteError::Closed)?;
        let mut line = record.to_csv_row();
        line.push('\n');
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush and close the file; later calls are no-ops
    pub fn close(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if let Err(e) = writer.flush() {
            tracing::error!("Failed to flush log {}: {}", self.path.display(), e);
        }
        match writer.into_inner() {
            Ok(file) => {
                if let Err(e) = file.sync_all() {
                    tracing::warn!("Failed to sync log {}: {}", self.path.display(), e);
                }
            }
            Err(e) => tracing::error!("Failed to close log {}: {}", self.path.display(), e),
        }
        tracing::info!(
            "Logging stopped: {} ({} rows)",
            self.path.display(),
            self.rows_written
        );
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Data rows written, header excluded
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for status messages
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_formatting() {
        let frame = CanFrame::data_frame(0x18FF03EF, &[0x01, 0xAB, 0x00])
            .unwrap()
            .with_timestamp(12.5);
        let record = LogRecord::from_frame(&frame, 7, "can0");
        assert_eq!(
            record.to_csv_row(),
            "12.500000,18FF03EF,E,Data,3,01AB00,7,can0"
        );
    }

    #[test]
    fn test_remote_and_error_rows() {
        let remote = CanFrame::remote_frame(0x7DF, 8).unwrap().with_channel("vcan1");
        let row = LogRecord::from_frame(&remote, 1, "can0").to_csv_row();
        assert_eq!(row, "0.000000,7DF,S,Remote,8,N/A,1,vcan1");

        let error = CanFrame::error_frame(&[0x04, 0x20]);
        let row = LogRecord::from_frame(&error, 2, "can0").to_csv_row();
        assert_eq!(row, "0.000000,0,S,Error,2,0420,2,can0");
    }

    #[test]
    fn test_bus_label_quoted() {
        let frame = CanFrame::data_frame(1, &[]).unwrap().with_channel("a,b");
        let row = LogRecord::from_frame(&frame, 1, "").to_csv_row();
        assert!(row.ends_with(",\"a,b\""));
    }

    #[test]
    fn test_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut writer = LogWriter::create(&path).unwrap();

        for seq in 1..=5 {
            let frame = CanFrame::data_frame(0x100, &[seq as u8]).unwrap();
            writer
                .write(&LogRecord::from_frame(&frame, seq, "test0"))
                .unwrap();
        }
        assert_eq!(writer.rows_written(), 5);
        writer.close();
        assert!(!writer.is_open());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], LOG_HEADER);
        assert!(lines[5].ends_with(",5,test0"));
    }

    #[test]
    fn test_rows_visible_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.csv");
        let mut writer = LogWriter::create(&path).unwrap();
        let frame = CanFrame::data_frame(0x1, &[0xFF]).unwrap();
        writer.write(&LogRecord::from_frame(&frame, 1, "x")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LogWriter::create(dir.path().join("c.csv")).unwrap();
        writer.close();
        writer.close();
        let frame = CanFrame::data_frame(0x1, &[]).unwrap();
        let err = writer
            .write(&LogRecord::from_frame(&frame, 1, "x"))
            .unwrap_err();
        assert!(matches!(err, LogWriteError::Closed));
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = LogWriter::create(dir.path().join("missing").join("log.csv"));
        assert!(result.is_err());
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drop.csv");
        {
            let mut writer = LogWriter::create(&path).unwrap();
            let frame = CanFrame::data_frame(0x2, &[1, 2]).unwrap();
            writer.write(&LogRecord::from_frame(&frame, 1, "x")).unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
