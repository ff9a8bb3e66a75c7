//! The consumer scan loop.

use blescan_core::codec::{encode_scan_command, parse_line, Frame};
use blescan_core::config::{FramerSettings, Settings};
use blescan_core::error::ScanError;
use blescan_core::{Aggregator, DeviceRecord, LineFramer, Outcome, Transport};
use tracing::{debug, info, warn};

/// Line counts for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Non-empty lines read, `END` included.
    pub lines: usize,
    /// Device lines accepted.
    pub device_lines: usize,
    /// Lines that were not protocol lines.
    pub ignored: usize,
    /// Device lines that could not be parsed.
    pub malformed: usize,
    /// Lines cut at the buffer limit.
    pub truncated: usize,
    /// Devices dropped at the aggregator ceiling.
    pub dropped: usize,
}

/// Result of a completed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Merged devices, strongest first.
    pub devices: Vec<DeviceRecord>,
    /// Line counts.
    pub stats: ScanStats,
}

/// Sends one scan command and collects the reply.
#[derive(Debug)]
pub struct ScanClient<T> {
    framer: LineFramer<T>,
    framing: FramerSettings,
    initial_capacity: usize,
    max_devices: Option<usize>,
}

impl<T: Transport> ScanClient<T> {
    /// Wrap `transport` with framing and aggregation from `settings`.
    pub fn new(transport: T, settings: &Settings) -> Self {
        Self {
            framer: LineFramer::new(transport)
                .with_capacity(settings.framer.line_capacity)
                .with_poll_interval(settings.framer.poll_interval()),
            framing: settings.framer.clone(),
            initial_capacity: settings.aggregator.initial_capacity,
            max_devices: settings.aggregator.max_devices,
        }
    }

    /// Request a scan of `timeout_ms` and read results until `END`.
    ///
    /// Each line may take up to the scan's whole seconds plus the grace
    /// period. Lines that are not protocol lines, or are malformed, are
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`ScanError::CommandSendFailed`] if the command cannot be written,
    /// [`ScanError::SessionTimeout`] if a line deadline passes, or
    /// [`ScanError::TransportIo`] if the link fails.
    pub fn run(&mut self, timeout_ms: u32) -> Result<ScanOutcome, ScanError> {
        let command = encode_scan_command(timeout_ms);
        self.framer
            .get_mut()
            .send(command.as_bytes())
            .map_err(|e| ScanError::CommandSendFailed(e.to_string()))?;
        info!(timeout_ms, "Scan command sent");

        let deadline = self.framing.line_deadline(timeout_ms);
        let mut aggregator =
            Aggregator::with_capacity(self.initial_capacity).with_ceiling(self.max_devices);
        let mut stats = ScanStats::default();

        loop {
            let line = self.framer.read_line(deadline)?;
            if line.is_empty() {
                continue;
            }
            stats.lines += 1;
            if line.truncated {
                stats.truncated += 1;
                warn!(len = line.text.len(), "Line exceeded buffer, truncated");
            }

            match parse_line(&line.text) {
                Ok(Some(Frame::End)) => break,
                Ok(Some(Frame::Device(record))) => {
                    stats.device_lines += 1;
                    if aggregator.add_or_update(record) == Outcome::Dropped {
                        stats.dropped += 1;
                    }
                }
                Ok(None) => {
                    stats.ignored += 1;
                    debug!(line = %line.text, "ignoring non-protocol line");
                }
                Err(e) => {
                    stats.malformed += 1;
                    debug!(line = %line.text, error = %e, "skipping malformed line");
                }
            }
        }

        info!(
            devices = aggregator.len(),
            lines = stats.lines,
            malformed = stats.malformed,
            "Scan results received"
        );
        Ok(ScanOutcome {
            devices: aggregator.drain_sorted(),
            stats,
        })
    }

    /// Release the transport.
    pub fn into_transport(self) -> T {
        self.framer.into_inner()
    }
}
