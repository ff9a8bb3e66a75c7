//! Command-line interface.

use std::path::PathBuf;

use blescan_core::config::Settings;
use blescan_core::OutputFormat;
use clap::Parser;

/// Request a BLE scan from a blescan agent and print the discovered devices.
#[derive(Debug, Parser)]
#[command(name = "blescan")]
#[command(author, version, about)]
#[command(after_help = "Examples:\n  blescan /dev/ttyUSB0 10000\n  blescan --csv /dev/tty.usbserial-XXXX 15000")]
pub struct Cli {
    /// Output results in CSV format (same as --format csv)
    #[arg(long, conflicts_with = "format")]
    pub csv: bool,

    /// Output format: table, csv or json
    #[arg(short, long, env = "BLESCAN_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Hide devices weaker than this many dBm
    #[arg(long, allow_negative_numbers = true)]
    pub min_rssi: Option<i32>,

    /// Serial line speed
    #[arg(long)]
    pub baud: Option<u32>,

    /// Configuration file path
    #[arg(short, long, env = "BLESCAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Serial device the agent is attached to
    pub port: String,

    /// Scan duration in milliseconds
    pub timeout_ms: u32,
}

impl Cli {
    /// Apply command-line overrides to loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if self.csv {
            settings.report.format = OutputFormat::Csv;
        } else if let Some(format) = self.format {
            settings.report.format = format;
        }
        if let Some(min_rssi) = self.min_rssi {
            settings.report.min_rssi = Some(min_rssi);
        }
        if let Some(baud) = self.baud {
            settings.serial.baud_rate = baud;
        }
    }
}
