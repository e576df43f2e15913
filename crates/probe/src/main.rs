//! aoa-probe
//!
//! Reports every USB device that appears on the host and whether it supports
//! the Android Open Accessory protocol. Runs until interrupted with Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use probe::config::{ProbeConfig, expand_path};
use probe::{Dispatcher, ProbeError, RusbPlatform, StdioSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "aoa-probe")]
#[command(
    author,
    version,
    about = "Probe attached USB devices for Android Open Accessory support"
)]
#[command(long_about = "
Watches the USB bus and reports every device that is present at startup or
plugged in later, together with the AOA protocol version it supports.

EXAMPLES:
    # Run with default config
    aoa-probe

    # Run with a custom config
    aoa-probe --config ~/probe.toml

    # Run with debug logging
    aoa-probe --log-level debug

CONFIGURATION:
    The probe looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/aoa-probe/probe.toml
    3. /etc/aoa-probe/probe.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error); defaults to warn
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ProbeConfig::default();
        let path = ProbeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let (config, fallback) = if let Some(ref path) = args.config {
        let config =
            ProbeConfig::load(Some(expand_path(path))).context("Failed to load configuration")?;
        (config, None)
    } else {
        ProbeConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    if let Some(e) = fallback {
        warn!("Failed to load config: {:#}, using defaults", e);
    }

    info!("aoa-probe v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let platform = RusbPlatform::init().map_err(ProbeError::PlatformInit)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone());

    let dispatcher = Dispatcher::new(
        platform,
        config.dispatcher_settings(),
        Arc::new(StdioSink),
        shutdown,
    );

    // The pump blocks, so it gets a dedicated thread off the async runtime
    let summary = tokio::task::spawn_blocking(move || dispatcher.run())
        .await
        .context("Dispatcher thread panicked")??;

    info!(
        "Shutdown complete: {} device(s) probed, {} probe(s) abandoned",
        summary.workers_started, summary.workers_abandoned
    );
    Ok(())
}

/// Raise the termination flag on Ctrl+C
fn spawn_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                shutdown.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                error!("Error waiting for Ctrl+C: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments() {
        let args = Args::try_parse_from(["aoa-probe"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.save_config);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn test_arguments() {
        let args =
            Args::try_parse_from(["aoa-probe", "-c", "~/probe.toml", "--log-level", "debug"])
                .unwrap();
        assert_eq!(args.config.as_deref(), Some("~/probe.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
