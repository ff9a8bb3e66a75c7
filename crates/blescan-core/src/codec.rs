//! Line protocol shared by producer and consumer.
//!
//! ```text
//! SCAN <timeout_ms>                    consumer -> producer
//! DEV,<MAC>,<RSSI>,<NAME>              producer -> consumer, one per device
//! END                                  producer -> consumer, end of batch
//! ```
//!
//! Lines end with a bare `\n`. Readers strip a trailing `\r`; writers never
//! emit one. `<NAME>` may be empty and never contains a comma.
//!
//! Parsing is deliberately lenient: unknown lines are "no match" rather than
//! errors, a malformed RSSI reads as 0, and fields after the name are ignored.

use std::io::{self, Write};

use thiserror::Error;

use crate::sanitize::sanitize_name;
use crate::types::{DeviceRecord, MacAddress, CONSUMER_NAME_CAPACITY};

/// Prefix of every device line.
pub const DEVICE_PREFIX: &str = "DEV,";

/// Control line that terminates a result batch.
pub const END_MARKER: &str = "END";

/// Keyword of the scan command.
pub const SCAN_KEYWORD: &str = "SCAN";

/// Field separator.
const SEPARATOR: char = ',';

/// A recognized protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One device result.
    Device(DeviceRecord),
    /// End of the current result batch.
    End,
}

/// A command sent from consumer to producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run one scan window of the given length.
    Scan {
        /// Window length in milliseconds.
        timeout_ms: u32,
    },
}

/// Errors produced while parsing protocol lines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A device line carried fewer than address and RSSI.
    #[error("device line is missing fields: '{line}'")]
    MissingFields {
        /// The offending line.
        line: String,
    },

    /// The address field is not `XX:XX:XX:XX:XX:XX`.
    #[error("invalid device address '{input}': expected XX:XX:XX:XX:XX:XX")]
    InvalidAddress {
        /// The offending field.
        input: String,
    },

    /// A command line is not `SCAN <positive integer>`.
    #[error("unrecognized command '{line}': expected 'SCAN <timeout_ms>'")]
    InvalidCommand {
        /// The offending line.
        line: String,
    },
}

// ============================================================================
// Device lines
// ============================================================================

/// Serialize a record as one `DEV` line, newline included.
#[must_use]
pub fn encode_device(record: &DeviceRecord) -> String {
    let name = record.name.as_deref().map_or_else(String::new, |n| {
        sanitize_name(n.as_bytes(), n.len() + 1)
    });
    format!(
        "{DEVICE_PREFIX}{},{},{name}\n",
        record.address, record.signal_strength
    )
}

/// Write one `DEV` line.
///
/// # Errors
///
/// Propagates write failures from `out`.
pub fn write_device<W: Write + ?Sized>(out: &mut W, record: &DeviceRecord) -> io::Result<()> {
    out.write_all(encode_device(record).as_bytes())
}

/// Write the `END` control line.
///
/// # Errors
///
/// Propagates write failures from `out`.
pub fn write_end<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
    out.write_all(END_MARKER.as_bytes())?;
    out.write_all(b"\n")
}

/// Parse one line with its newline already removed.
///
/// Returns `Ok(None)` for lines that are not part of the protocol.
///
/// # Errors
///
/// Returns a [`CodecError`] for `DEV` lines without address and RSSI or with
/// an unparseable address. Callers treat these as recoverable.
pub fn parse_line(line: &str) -> Result<Option<Frame>, CodecError> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line == END_MARKER {
        return Ok(Some(Frame::End));
    }
    let Some(rest) = line.strip_prefix(DEVICE_PREFIX) else {
        return Ok(None);
    };

    let mut fields = rest.split(SEPARATOR);
    let (Some(address), Some(rssi)) = (fields.next(), fields.next()) else {
        return Err(CodecError::MissingFields {
            line: line.to_owned(),
        });
    };
    let name = fields.next().unwrap_or("");

    let address = MacAddress::parse(address)?;
    let signal_strength = parse_signal_strength(rssi);
    let name = (!name.is_empty()).then(|| truncate(name, CONSUMER_NAME_CAPACITY - 1).to_owned());

    Ok(Some(Frame::Device(DeviceRecord::new(
        address,
        signal_strength,
        name,
    ))))
}

/// Parse an RSSI field leniently.
///
/// Leading whitespace, an optional sign and the leading digits are read;
/// anything after the digits is ignored. A field with no digits, or a value
/// that does not fit in an `i32`, reads as 0.
#[must_use]
pub fn parse_signal_strength(field: &str) -> i32 {
    let trimmed = field.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return 0;
    }

    let Ok(magnitude) = digits[..end].parse::<i64>() else {
        return 0;
    };
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).unwrap_or(0)
}

/// Cut `s` to at most `max` bytes on a character boundary.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// Commands
// ============================================================================

/// Serialize a scan command, newline included.
#[must_use]
pub fn encode_scan_command(timeout_ms: u32) -> String {
    format!("{SCAN_KEYWORD} {timeout_ms}\n")
}

/// Parse a command line with its newline already removed.
///
/// # Errors
///
/// Returns [`CodecError::InvalidCommand`] unless the line is `SCAN` followed
/// by a positive decimal integer.
pub fn parse_command(line: &str) -> Result<Command, CodecError> {
    let invalid = || CodecError::InvalidCommand {
        line: line.to_owned(),
    };

    let mut parts = line.trim_end_matches(['\r', '\n']).split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(SCAN_KEYWORD), Some(value), None) => {
            let timeout_ms: u32 = value.parse().map_err(|_| invalid())?;
            if timeout_ms == 0 {
                return Err(invalid());
            }
            Ok(Command::Scan { timeout_ms })
        }
        _ => Err(invalid()),
    }
}
