//! CAN Bus Analyzer - Main Entry Point
//!
//! Terminal front end: prints the receive table to stdout and status lines
//! to stderr, optionally logging to CSV and injecting frames.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use canvis_rs::{
    app::AnalyzerApp,
    backend::{DefaultBusFactory, TrafficGenerator, VirtualHub},
    config::{default_config_path, AppConfig, Bitrate, BusInterface},
    frontend::{ConsoleDisplay, MemoryPlotView},
    types::ConnectionState,
};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "canvis", version, about = "Real-time CAN bus analyzer")]
struct Cli {
    /// Bus interface (socketcan, slcan, pcan, vector, virtual).
    #[arg(long, value_name = "IFACE")]
    interface: Option<BusInterface>,

    /// Channel name, e.g. can0 or COM3.
    #[arg(long, value_name = "NAME")]
    channel: Option<String>,

    /// Bitrate in bits per second.
    #[arg(long, value_name = "BPS")]
    bitrate: Option<u32>,

    /// Config file (.json or .toml); defaults to the app data directory.
    #[arg(long, value_name = "PATH", env = "CANVIS_CONFIG")]
    config: Option<PathBuf>,

    /// Log received frames to this CSV file.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Stop after this many seconds; otherwise run until Ctrl-C.
    #[arg(long, value_name = "SECS")]
    duration: Option<f64>,

    /// Generate synthetic traffic on the virtual bus.
    #[arg(long)]
    demo: bool,

    /// Interval between generated frames in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 20)]
    demo_interval: u64,

    /// Send a frame after connecting: ID#DATA (hex), or ID#R for a remote frame.
    #[arg(long, value_name = "ID#DATA")]
    send: Vec<String>,

    /// Do not print frame rows.
    #[arg(long, short)]
    quiet: bool,

    /// Also write diagnostics to a daily-rotated file in this directory.
    #[arg(long, value_name = "DIR")]
    diag_dir: Option<PathBuf>,
}

fn init_tracing(diag_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,canvis_rs=debug"));

    let (file_layer, guard) = match diag_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating diagnostics directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "canvis.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}

/// Split `ID#DATA` / `ID#R` into send-form fields
fn parse_send_arg(arg: &str) -> anyhow::Result<(String, String, bool)> {
    let (id, data) = arg
        .split_once('#')
        .with_context(|| format!("expected ID#DATA, got '{}'", arg))?;
    if data.eq_ignore_ascii_case("r") {
        Ok((id.to_string(), String::new(), true))
    } else {
        Ok((id.to_string(), data.to_string(), false))
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("signal handler setup failed")
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => default_config_path()
            .map(AppConfig::load_or_default)
            .unwrap_or_default(),
    };

    if let Some(interface) = cli.interface {
        config.connection.interface = interface;
    }
    if let Some(channel) = &cli.channel {
        config.connection.channel = channel.clone();
    }
    if let Some(bps) = cli.bitrate {
        config.connection.bitrate = Bitrate::new(bps)?;
    }
    if cli.demo && config.connection.interface != BusInterface::Virtual {
        tracing::warn!(
            "--demo uses the virtual bus; ignoring interface {}",
            config.connection.interface
        );
        config.connection.interface = BusInterface::Virtual;
    }
    config.connection.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _diag_guard = init_tracing(cli.diag_dir.as_deref())?;

    tracing::info!("Starting CAN bus analyzer");

    let config = load_config(&cli)?;
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;
    let channel = config.connection.channel.clone();

    let hub = VirtualHub::new();
    let factory = Arc::new(DefaultBusFactory::new(hub.clone()));
    let display = if cli.quiet {
        ConsoleDisplay::quiet()
    } else {
        ConsoleDisplay::new()
    };
    let mut app = AnalyzerApp::new(config, factory, display, MemoryPlotView::default());

    let mut generator = if cli.demo {
        Some(TrafficGenerator::start(
            &hub,
            &channel,
            Duration::from_millis(cli.demo_interval.max(1)),
        )?)
    } else {
        None
    };

    app.connect()?;
    if let Some(path) = &cli.log {
        let path = app.start_logging(Some(path.as_path()))?;
        tracing::info!("Writing frames to {}", path.display());
    }

    let connect_deadline = Instant::now() + Duration::from_secs(2);
    while app.state() == ConnectionState::Connecting && Instant::now() < connect_deadline {
        app.tick(Duration::from_millis(50));
    }

    for arg in &cli.send {
        let (id, data, remote) = parse_send_arg(arg)?;
        if let Err(e) = app.send_request(&id, &data, remote) {
            tracing::warn!("Could not send {}: {}", arg, e);
        }
    }

    let run_deadline = cli
        .duration
        .and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok())
        .and_then(|d| Instant::now().checked_add(d));
    while app.state() != ConnectionState::Disconnected && running.load(Ordering::SeqCst) {
        if run_deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        app.tick(Duration::from_millis(100));
    }

    app.shutdown();
    if let Some(generator) = generator.as_mut() {
        generator.stop();
    }

    let stats = app.stats().clone();
    eprintln!(
        "Received {} frames, sent {}, {} errors, {} log rows ({} failed)",
        stats.frames_received,
        stats.frames_sent,
        stats.errors,
        stats.log_rows_written,
        stats.log_write_failures
    );
    for (id, samples) in &app.plot_view().series {
        if let Some(last) = samples.last() {
            eprintln!(
                "Plot {:X}: {} samples, last {} at #{}",
                id,
                samples.len(),
                last.value,
                last.sequence
            );
        }
    }

    Ok(())
}
