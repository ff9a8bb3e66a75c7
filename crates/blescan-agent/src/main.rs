//! # blescan-agent
//!
//! Scanning agent for the blescan system.
//!
//! Reads `SCAN <timeout_ms>` lines on stdin and writes each window's results
//! to stdout as `DEV,<MAC>,<RSSI>,<NAME>` lines followed by `END`. Attach
//! stdin/stdout to the serial link (getty, socat or a systemd unit).
//!
//! ## Running
//!
//! ```bash
//! # On demand
//! blescan-agent
//!
//! # Continuous 5-second windows
//! blescan-agent --continuous
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use blescan_agent::{logging, Agent};
use blescan_core::bluetooth::{event_channel, EventSender};
use blescan_core::config::Settings;
use blescan_core::error::ScanError;
use blescan_core::session::EmitMode;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

/// Run BLE scan windows on command and stream the results.
#[derive(Debug, Parser)]
#[command(name = "blescan-agent")]
#[command(author, version, about)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "BLESCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Scan back-to-back without waiting for commands
    #[arg(long)]
    continuous: bool,

    /// Window length in continuous mode, in milliseconds
    #[arg(long)]
    window_ms: Option<u32>,

    /// Pause between continuous windows, in milliseconds
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Exit after this many windows
    #[arg(long)]
    windows: Option<usize>,

    /// Report devices at or above this many dBm
    #[arg(long, allow_negative_numbers = true)]
    min_rssi: Option<i32>,

    /// Most distinct devices per window
    #[arg(long)]
    max_devices: Option<usize>,

    /// When to write results: aggregated or passthrough
    #[arg(long)]
    emit_mode: Option<EmitMode>,

    /// JSON file logging for deployment
    #[arg(long, env = "BLESCAN_PRODUCTION")]
    production: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        settings.agent.continuous |= self.continuous;
        if let Some(window_ms) = self.window_ms {
            settings.agent.window_ms = window_ms;
        }
        if let Some(cooldown_ms) = self.cooldown_ms {
            settings.agent.cooldown_ms = cooldown_ms;
        }
        if let Some(min_rssi) = self.min_rssi {
            settings.agent.min_rssi = Some(min_rssi);
        }
        if let Some(max_devices) = self.max_devices {
            settings.agent.max_devices = Some(max_devices);
        }
        if let Some(emit_mode) = self.emit_mode {
            settings.agent.emit_mode = emit_mode;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    logging::init(args.production)?;

    info!("Starting blescan-agent");

    let mut settings = Settings::load(args.config.as_deref()).map_err(ScanError::from)?;
    args.apply(&mut settings);
    settings.validate().map_err(ScanError::from)?;

    let (events_tx, events_rx) = event_channel();
    let radio = open_radio(events_tx).await?;

    let mut agent = Agent::from_settings(radio, std::io::stdout(), events_rx, &settings)
        .with_max_windows(args.windows);
    let commands = BufReader::new(tokio::io::stdin());

    tokio::select! {
        result = agent.run(commands) => {
            let windows = result?;
            info!(windows, "Agent stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

#[cfg(feature = "bluetooth")]
async fn open_radio(events: EventSender) -> anyhow::Result<blescan_core::BluezRadio> {
    Ok(blescan_core::BluezRadio::new(events)
        .await
        .map_err(ScanError::from)?)
}

#[cfg(not(feature = "bluetooth"))]
#[allow(clippy::unused_async)]
async fn open_radio(events: EventSender) -> anyhow::Result<blescan_core::MockRadio> {
    use blescan_core::types::{MacAddress, Sighting};

    info!("Built without BlueZ support, using the scripted radio");
    let demo = vec![
        Sighting::new(MacAddress::new([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]), -48, Some(b"Demo Tag".to_vec())),
        Sighting::new(MacAddress::new([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x02]), -71, None),
    ];
    Ok(blescan_core::MockRadio::new(events).with_sightings(demo))
}
