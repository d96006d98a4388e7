use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::info;
use pspkai_bridge::{Bridge, BridgeConfig, LoggingSink};

/// Relay 802.11 ad-hoc frames between a PSP's USB WiFi tunnel and a WiFi-plugin collaborator.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Load tunables from a JSON config file, falling back to defaults for anything unset.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Capacity of each bounded queue (WiFi-in and USB-out).
    #[arg(long)]
    max_buffered_messages: Option<usize>,

    /// Cap on full device-reset cycles before terminal shutdown.
    #[arg(long)]
    max_fatal_retries: Option<u32>,

    /// Cap on consecutive bulk read/write failures before escalating to a fatal error.
    #[arg(long)]
    max_read_write_retries: Option<u32>,

    /// Per bulk-read timeout, in milliseconds.
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Per bulk-write timeout, in milliseconds.
    #[arg(long)]
    write_timeout_ms: Option<u64>,
}

fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        }
        None => BridgeConfig::default(),
    };

    if let Some(v) = cli.max_buffered_messages {
        config.max_buffered_messages = v;
    }
    if let Some(v) = cli.max_fatal_retries {
        config.max_fatal_retries = v;
    }
    if let Some(v) = cli.max_read_write_retries {
        config.max_read_write_retries = v;
    }
    if let Some(v) = cli.read_timeout_ms {
        config.read_timeout_ms = v;
    }
    if let Some(v) = cli.write_timeout_ms {
        config.write_timeout_ms = v;
    }

    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut bridge = Bridge::new(config);
    if !bridge.open() {
        anyhow::bail!("no PSP found on the USB bus");
    }
    bridge.set_egress_sink(Arc::new(LoggingSink::new("xlink-kai")));

    if !bridge.start() {
        anyhow::bail!("failed to start bridge worker threads");
    }
    info!("bridge running, press Ctrl+C to stop");

    let stopping = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let handler_flag = stopping.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, std::sync::atomic::Ordering::Relaxed);
    })?;

    while !stopping.load(std::sync::atomic::Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("shutting down");
    bridge.close();
    Ok(())
}
