//! Autoterm gateway daemon entry point.
//!
//! Runs the passthrough engine headless: loads configuration, sets up the
//! file log sink, starts the engine, and idles until a shutdown signal,
//! logging a state snapshot periodically and on SIGHUP.

mod signals;

use anyhow::{Context, Result};
use autoterm_bridge::{Bridge, GatewayConfig};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

use crate::signals::SignalHandler;

/// Gateway daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "autoterm-daemon",
    about = "Autoterm gateway daemon - transparent heater/panel passthrough",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// First serial port (overrides config file).
    #[arg(long, value_name = "DEV")]
    port_a: Option<String>,

    /// Second serial port (overrides config file).
    #[arg(long, value_name = "DEV")]
    port_b: Option<String>,

    /// USB serial number locating both ports (overrides config file).
    #[arg(long, value_name = "SERIAL")]
    usb_serial: Option<String>,

    /// Log file path (overrides config file).
    #[arg(long, value_name = "FILE")]
    log_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', value_name = "LEVEL")]
    log_level: Option<String>,
}

/// Spacing of unsolicited state snapshots in the log.
const SNAPSHOT_PERIOD: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let log_path = config
        .log
        .path
        .clone()
        .context("a log path is required (config [log] path or --log-path)")?;
    let _guard = init_logging(&log_path, &config.log.level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting autoterm gateway"
    );

    let serial = config.serial_config().context("invalid link configuration")?;
    let signal_handler = SignalHandler::new().context("failed to set up signal handlers")?;

    let mut bridge = Bridge::open(serial).context("failed to start passthrough engine")?;

    run(&bridge, &signal_handler);

    info!("shutting down...");
    bridge.stop();
    info!("daemon shutdown complete");
    Ok(())
}

/// Load configuration from file or defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = if let Some(config_path) = &args.config {
        GatewayConfig::from_file(config_path)
            .with_context(|| format!("failed to load config from {config_path:?}"))?
    } else {
        let default_path = PathBuf::from("config/gateway.toml");
        if default_path.exists() {
            info!(?default_path, "using default configuration file");
            GatewayConfig::from_file(&default_path)
                .with_context(|| format!("failed to load config from {default_path:?}"))?
        } else {
            GatewayConfig::default()
        }
    };

    if let Some(port) = &args.port_a {
        config.link.port_a = Some(port.clone());
    }
    if let Some(port) = &args.port_b {
        config.link.port_b = Some(port.clone());
    }
    if let Some(serial_num) = &args.usb_serial {
        config.link.usb_serial = Some(serial_num.clone());
    }
    if let Some(path) = &args.log_path {
        config.log.path = Some(path.clone());
    }
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }
    Ok(config)
}

/// Route all log output to the configured file, without ANSI colors.
///
/// The returned guard must stay alive for the daemon's lifetime so the
/// non-blocking writer flushes on exit.
fn init_logging(
    path: &Path,
    level: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let filename = path.file_name().context("log path has no file name")?;

    let appender = tracing_appender::rolling::never(directory, filename);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let default_filter = format!(
        "autoterm_daemon={level},autoterm_bridge={level},autoterm_link={level},autoterm_proto={level}"
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .init();

    Ok(guard)
}

/// Idle until a shutdown signal, logging snapshots on SIGHUP and on the
/// periodic schedule.
fn run(bridge: &Bridge, signals: &SignalHandler) {
    let mut last_snapshot = Instant::now();
    while !signals.shutdown_requested() {
        std::thread::sleep(Duration::from_millis(500));

        if signals.take_reload_request() {
            log_snapshot(bridge);
        }

        if last_snapshot.elapsed() >= SNAPSHOT_PERIOD {
            last_snapshot = Instant::now();
            log_snapshot(bridge);
        }
    }
}

fn log_snapshot(bridge: &Bridge) {
    let registers = bridge.registers();
    info!(
        status = bridge.heater_status_text().unwrap_or("unknown"),
        voltage = ?registers.battery_voltage.value(),
        heater_c = ?registers.heater_temperature.value(),
        external_c = ?registers.external_temperature.value(),
        shutdown_pending = bridge.shutdown_pending(),
        "state snapshot"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["autoterm-daemon", "--usb-serial", "A50285BI"]);
        assert_eq!(args.usb_serial.as_deref(), Some("A50285BI"));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_args_with_ports() {
        let args = Args::parse_from([
            "autoterm-daemon",
            "--port-a",
            "/dev/ttyUSB0",
            "--port-b",
            "/dev/ttyUSB1",
            "-l",
            "debug",
        ]);
        assert_eq!(args.port_a.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(args.port_b.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[link]\nport_a = \"/dev/ttyS0\"\nport_b = \"/dev/ttyS1\"\n\n[log]\nlevel = \"warn\""
        )
        .unwrap();

        let args = Args::parse_from([
            "autoterm-daemon",
            "-c",
            file.path().to_str().unwrap(),
            "--port-a",
            "/dev/ttyUSB7",
            "-l",
            "trace",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.link.port_a.as_deref(), Some("/dev/ttyUSB7"));
        assert_eq!(config.link.port_b.as_deref(), Some("/dev/ttyS1"));
        assert_eq!(config.log.level, "trace");
    }

    #[test]
    fn test_defaults_without_config_file() {
        let args = Args::parse_from(["autoterm-daemon"]);
        let config = load_config(&args).unwrap();
        assert!(config.log.path.is_none());
        assert_eq!(config.log.level, "info");
    }
}
