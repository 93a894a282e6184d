//! Configuration module for CanVis-RS
//!
//! This module handles application configuration including:
//! - Bus connection parameters (interface, channel, bitrate)
//! - Plot buffer sizing and subscriptions
//! - CSV logging location
//! - Shutdown and status display timing
//!
//! # App Data Location
//!
//! The default configuration file lives in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.canvis-rs/config.json`
//! - **macOS**: `~/Library/Application Support/dev.canvis-rs/config.json`
//! - **Windows**: `%APPDATA%\dev.canvis-rs\config.json`
//!
//! Files ending in `.toml` are read and written as TOML; anything else is JSON.
//!
//! # Example
//!
//! ```ignore
//! use canvis_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default(&path);
//! config.connection.channel = "can1".to_string();
//! config.save(&path)?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{CanVisError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.canvis-rs";

/// Config filename inside the app data directory
pub const CONFIG_FILE: &str = "config.json";

/// Bitrates the settings surface accepts, in bits per second
pub const SUPPORTED_BITRATES: [u32; 4] = [125_000, 250_000, 500_000, 1_000_000];

/// Default bitrate in bits per second
pub const DEFAULT_BITRATE: u32 = 500_000;

/// Default number of samples retained per plotted id
pub const DEFAULT_PLOT_CAPACITY: usize = 200;

/// Default plot refresh cadence in milliseconds
pub const DEFAULT_PLOT_REFRESH_MS: u64 = 100;

/// Upper bound on the plot refresh cadence; also bounds how long a tick blocks
pub const MAX_PLOT_REFRESH_MS: u64 = 100;

/// Default id plotted when no subscriptions are configured
pub const DEFAULT_PLOT_ID: u32 = 0x18FF_03EF;

/// Default graceful shutdown budget for the bus thread in milliseconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;

/// Default bus poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Upper bound on the bus poll interval; keeps the stop flag responsive
pub const MAX_POLL_INTERVAL_MS: u64 = 100;

/// Default time an error message stays on the status surface
pub const DEFAULT_ERROR_DISPLAY_MS: u64 = 5000;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Bus Interface ====================

/// Transport backend used to reach the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusInterface {
    /// Linux SocketCAN
    SocketCan,
    /// Serial-line CAN adapters (LAWICEL protocol)
    Slcan,
    /// PEAK-System adapters
    Pcan,
    /// Vector adapters
    Vector,
    /// In-process virtual bus
    Virtual,
}

impl BusInterface {
    pub const ALL: [BusInterface; 5] = [
        BusInterface::SocketCan,
        BusInterface::Slcan,
        BusInterface::Pcan,
        BusInterface::Vector,
        BusInterface::Virtual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusInterface::SocketCan => "socketcan",
            BusInterface::Slcan => "slcan",
            BusInterface::Pcan => "pcan",
            BusInterface::Vector => "vector",
            BusInterface::Virtual => "virtual",
        }
    }
}

impl Default for BusInterface {
    fn default() -> Self {
        if cfg!(windows) {
            BusInterface::Slcan
        } else {
            BusInterface::SocketCan
        }
    }
}

impl std::fmt::Display for BusInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BusInterface {
    type Err = CanVisError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        BusInterface::ALL
            .into_iter()
            .find(|i| i.as_str() == wanted)
            .ok_or_else(|| CanVisError::Config(format!("Unknown bus interface '{}'", s)))
    }
}

// ==================== Bitrate ====================

/// A bitrate from [`SUPPORTED_BITRATES`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Bitrate(u32);

impl Bitrate {
    pub fn new(bps: u32) -> Result<Self> {
        if SUPPORTED_BITRATES.contains(&bps) {
            Ok(Self(bps))
        } else {
            Err(CanVisError::Config(format!(
                "Unsupported bitrate {} (supported: {:?})",
                bps, SUPPORTED_BITRATES
            )))
        }
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    pub fn kbps(&self) -> u32 {
        self.0 / 1000
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Self(DEFAULT_BITRATE)
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = CanVisError;

    fn try_from(bps: u32) -> Result<Self> {
        Self::new(bps)
    }
}

impl From<Bitrate> for u32 {
    fn from(b: Bitrate) -> u32 {
        b.0
    }
}

impl std::fmt::Display for Bitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bps", self.0)
    }
}

// ==================== Connection Config ====================

/// Parameters for opening a bus session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub interface: BusInterface,
    pub channel: String,
    pub bitrate: Bitrate,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let channel = if cfg!(windows) { "COM3" } else { "can0" };
        Self {
            interface: BusInterface::default(),
            channel: channel.to_string(),
            bitrate: Bitrate::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(interface: BusInterface, channel: impl Into<String>, bitrate: Bitrate) -> Self {
        Self {
            interface,
            channel: channel.into(),
            bitrate,
        }
    }

    /// Virtual bus on the given channel at the default bitrate
    pub fn virtual_bus(channel: impl Into<String>) -> Self {
        Self::new(BusInterface::Virtual, channel, Bitrate::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(CanVisError::Config("Channel must not be empty".to_string()));
        }
        Bitrate::new(self.bitrate.bps())?;
        Ok(())
    }

    /// Short human-readable description, e.g. `socketcan:can0 @ 500000 bps`
    pub fn describe(&self) -> String {
        format!("{}:{} @ {}", self.interface, self.channel, self.bitrate)
    }
}

// ==================== Plot Config ====================

/// One plotted byte of one arbitration id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSubscription {
    pub id: u32,
    pub byte_index: usize,
}

impl PlotSubscription {
    pub fn new(id: u32, byte_index: usize) -> Self {
        Self { id, byte_index }
    }
}

/// Plot buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Maximum samples kept per id
    pub capacity: usize,
    /// Redraw cadence in milliseconds
    pub refresh_interval_ms: u64,
    /// Ids to sample
    pub subscriptions: Vec<PlotSubscription>,
}

impl PlotConfig {
    /// Refresh cadence, clamped to at most [`MAX_PLOT_REFRESH_MS`]
    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.refresh_interval_ms.clamp(1, MAX_PLOT_REFRESH_MS))
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PLOT_CAPACITY,
            refresh_interval_ms: DEFAULT_PLOT_REFRESH_MS,
            subscriptions: vec![PlotSubscription::new(DEFAULT_PLOT_ID, 0)],
        }
    }
}

// ==================== Log Config ====================

/// CSV logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory for automatically named log files (current directory if unset)
    pub directory: Option<PathBuf>,
    /// Append `.csv` to paths that lack it
    pub auto_extension: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            auto_extension: true,
        }
    }
}

impl LogConfig {
    /// Normalize a user-chosen log path
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let has_csv = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if self.auto_extension && !has_csv {
            let mut os = path.as_os_str().to_os_string();
            os.push(".csv");
            PathBuf::from(os)
        } else {
            path.to_path_buf()
        }
    }

    /// Timestamped log path inside the configured directory
    pub fn default_log_path(&self) -> PathBuf {
        let name = format!("can_log_{}.csv", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        match &self.directory {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

// ==================== Shutdown Config ====================

/// Bus thread timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long `disconnect` waits for the bus thread before abandoning it
    pub graceful_timeout_ms: u64,
    /// How long a single bus read may block before the stop flag is checked
    pub poll_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ShutdownConfig {
    pub fn graceful_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.graceful_timeout_ms)
    }

    /// Poll interval, clamped to at most [`MAX_POLL_INTERVAL_MS`]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.clamp(1, MAX_POLL_INTERVAL_MS))
    }
}

// ==================== Status Config ====================

/// Status surface timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// How long non-sticky error messages stay visible
    pub error_display_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            error_display_ms: DEFAULT_ERROR_DISPLAY_MS,
        }
    }
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub plot: PlotConfig,

    #[serde(default)]
    pub logging: LogConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub status: StatusConfig,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CanVisError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                CanVisError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                CanVisError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config.connection.validate()?;
        Ok(config)
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CanVisError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| CanVisError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| CanVisError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            CanVisError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

// ==================== Tests ====================
