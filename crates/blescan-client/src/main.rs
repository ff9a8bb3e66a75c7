//! # blescan
//!
//! Request one scan from a blescan agent and print the devices it found.
//!
//! ```bash
//! blescan /dev/ttyUSB0 10000
//! blescan --csv /dev/tty.usbserial-XXXX 15000
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::process::ExitCode;

use anyhow::Context;
use blescan_client::cli::Cli;
use blescan_client::{logging, ScanClient, SerialTransport};
use blescan_core::config::Settings;
use blescan_core::error::ScanError;
use blescan_core::Presenter;
use clap::Parser;
use tracing::info;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: logging disabled: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err.downcast_ref::<ScanError>().map_or(1, ScanError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).map_err(ScanError::from)?;
    cli.apply(&mut settings);
    let timeout_ms = settings.scan.check(cli.timeout_ms)?;

    info!(port = %cli.port, timeout_ms, "Starting scan");
    let transport = SerialTransport::open(
        &cli.port,
        settings.serial.baud_rate,
        settings.framer.poll_interval(),
    )?;

    let mut client = ScanClient::new(transport, &settings);
    let outcome = client.run(timeout_ms);
    // Close the port before printing.
    drop(client);
    let outcome = outcome?;

    Presenter::new(settings.report.format)
        .with_min_rssi(settings.report.min_rssi)
        .write_to(&mut std::io::stdout().lock(), &outcome.devices)
        .context("Failed to write results")?;
    Ok(())
}
