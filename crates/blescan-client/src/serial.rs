//! Raw serial link to the agent.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use blescan_core::error::ScanError;
use blescan_core::Transport;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

const READ_CHUNK: usize = 64;

/// A serial port in raw 8N1 mode without flow control.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
    pending: VecDeque<u8>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port.name())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Open and configure `path`, discarding anything already received.
    ///
    /// # Errors
    ///
    /// [`ScanError::TransportOpenFailed`] if the device cannot be opened,
    /// [`ScanError::TransportConfigFailed`] if it cannot be prepared.
    pub fn open(path: &str, baud_rate: u32, poll_interval: Duration) -> Result<Self, ScanError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(poll_interval)
            .open()
            .map_err(|e| ScanError::TransportOpenFailed {
                port: path.to_owned(),
                reason: e.description,
            })?;

        // Boot banners and stale results from an earlier run.
        port.clear(ClearBuffer::Input)
            .map_err(|e| ScanError::TransportConfigFailed(e.description))?;

        debug!(port = path, baud_rate, "serial port opened");
        Ok(Self {
            port,
            timeout: poll_interval,
            pending: VecDeque::with_capacity(READ_CHUNK),
        })
    }
}

impl Transport for SerialTransport {
    fn poll_byte(&mut self, wait: Duration) -> io::Result<Option<u8>> {
        if let Some(byte) = self.pending.pop_front() {
            return Ok(Some(byte));
        }

        if wait != self.timeout {
            self.port.set_timeout(wait)?;
            self.timeout = wait;
        }

        let mut chunk = [0u8; READ_CHUNK];
        match self.port.read(&mut chunk) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.pending.extend(&chunk[..n]);
                Ok(self.pending.pop_front())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}
