//! Unified error types for the blescan core library.
//!
//! This module provides a unified error type [`ScanError`] that covers all failure
//! modes across a scan run. Each module also has its own specific error type
//! (`FrameError`, `CodecError`, `ConfigError`, `RadioError`) for internal use.
//!
//! # Failure classes
//!
//! - **Transport faults** (open, configure, send, I/O) end the run
//! - **Session timeouts** end the run and are reported apart from transport faults
//! - **Protocol errors** (malformed lines, bad commands) are recoverable and
//!   normally absorbed before they reach a caller
//! - **Radio errors** come from the scanning backend on the producer side
//!
//! # Example
//!
//! ```rust
//! use blescan_core::error::{ScanError, Result};
//!
//! fn check_window(timeout_ms: u32) -> Result<u32> {
//!     if timeout_ms == 0 {
//!         return Err(ScanError::InvalidScanTimeout { value: 0, min: 1000, max: 300_000 });
//!     }
//!     Ok(timeout_ms)
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all blescan operations.
#[derive(Debug, Error)]
pub enum ScanError {
    // =========================================================================
    // TRANSPORT ERRORS
    // =========================================================================
    /// The byte-stream transport could not be opened.
    #[error("Cannot open serial port {port}: {reason}")]
    TransportOpenFailed {
        /// Transport identifier (device path).
        port: String,
        /// Underlying reason.
        reason: String,
    },

    /// The transport was opened but could not be put into raw mode.
    #[error("Failed to configure serial port: {0}")]
    TransportConfigFailed(String),

    /// The scan command could not be written to the transport.
    #[error("Failed to send command: {0}")]
    CommandSendFailed(String),

    /// A low-level I/O error occurred on the transport.
    #[error("Serial port I/O error: {0}")]
    TransportIo(#[from] std::io::Error),

    // =========================================================================
    // SESSION ERRORS
    // =========================================================================
    /// The overall deadline elapsed before the result stream completed.
    #[error("Timeout waiting for scan completion (waited {waited_secs}s)")]
    SessionTimeout {
        /// Seconds waited before giving up.
        waited_secs: u64,
    },

    /// A scan window was requested while another one is still active.
    #[error("A scan window is already active")]
    ScanAlreadyActive,

    /// The requested scan duration is outside the accepted bounds.
    #[error("Timeout must be between {min}ms and {max}ms (got {value}ms)")]
    InvalidScanTimeout {
        /// Requested value.
        value: u64,
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },

    // =========================================================================
    // PROTOCOL ERRORS
    // =========================================================================
    /// A device line had too few fields or an unparseable address.
    #[error("Malformed protocol line: {0}")]
    MalformedLine(String),

    /// A control command could not be understood.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // =========================================================================
    // RADIO ERRORS
    // =========================================================================
    /// No usable radio adapter is present.
    #[error("Bluetooth adapter unavailable: {0}")]
    RadioUnavailable(String),

    /// The radio failed to start or run a scan window.
    #[error("Failed to start BLE scan: {0}")]
    RadioScanFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the given path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),
}

/// A specialized [`Result`] type for blescan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

impl ScanError {
    /// Returns `true` if this error is a transport fault.
    #[inline]
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::TransportOpenFailed { .. }
                | Self::TransportConfigFailed(_)
                | Self::CommandSendFailed(_)
                | Self::TransportIo(_)
        )
    }

    /// Returns `true` if the overall session deadline elapsed.
    #[inline]
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::SessionTimeout { .. })
    }

    /// Returns `true` if this error is related to the line protocol.
    #[inline]
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(self, Self::MalformedLine(_) | Self::InvalidCommand(_))
    }

    /// Returns `true` if this error came from the radio backend.
    #[inline]
    #[must_use]
    pub const fn is_radio_error(&self) -> bool {
        matches!(self, Self::RadioUnavailable(_) | Self::RadioScanFailed(_))
    }

    /// Returns `true` if this error is related to configuration or arguments.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::ConfigParseError(_)
                | Self::ConfigValidationError(_)
                | Self::InvalidScanTimeout { .. }
        )
    }

    /// Returns `true` if the current run can continue after this error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedLine(_)
                | Self::InvalidCommand(_)
                | Self::ScanAlreadyActive
                | Self::RadioScanFailed(_)
        )
    }

    /// Returns the process exit code for this error.
    #[inline]
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            // 2 - bad arguments or configuration
            Self::InvalidScanTimeout { .. }
            | Self::ConfigNotFound(_)
            | Self::ConfigParseError(_)
            | Self::ConfigValidationError(_) => 2,

            // 3 - transport faults
            Self::TransportOpenFailed { .. }
            | Self::TransportConfigFailed(_)
            | Self::CommandSendFailed(_)
            | Self::TransportIo(_) => 3,

            // 4 - nothing complete arrived in time
            Self::SessionTimeout { .. } => 4,

            // 5 - radio backend
            Self::RadioUnavailable(_) | Self::RadioScanFailed(_) => 5,

            Self::ScanAlreadyActive | Self::MalformedLine(_) | Self::InvalidCommand(_) => 1,
        }
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::TransportOpenFailed { .. } => "TRANSPORT_OPEN_FAILED",
            Self::TransportConfigFailed(_) => "TRANSPORT_CONFIG_FAILED",
            Self::CommandSendFailed(_) => "COMMAND_SEND_FAILED",
            Self::TransportIo(_) => "TRANSPORT_IO_ERROR",
            Self::SessionTimeout { .. } => "SESSION_TIMEOUT",
            Self::ScanAlreadyActive => "SCAN_ALREADY_ACTIVE",
            Self::InvalidScanTimeout { .. } => "INVALID_SCAN_TIMEOUT",
            Self::MalformedLine(_) => "MALFORMED_LINE",
            Self::InvalidCommand(_) => "INVALID_COMMAND",
            Self::RadioUnavailable(_) => "RADIO_UNAVAILABLE",
            Self::RadioScanFailed(_) => "RADIO_SCAN_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::framer::FrameError> for ScanError {
    fn from(err: crate::framer::FrameError) -> Self {
        use crate::framer::FrameError;
        match err {
            FrameError::Timeout { elapsed } => Self::SessionTimeout {
                waited_secs: elapsed.as_secs(),
            },
            FrameError::Io(e) => Self::TransportIo(e),
        }
    }
}

impl From<crate::codec::CodecError> for ScanError {
    fn from(err: crate::codec::CodecError) -> Self {
        use crate::codec::CodecError;
        match err {
            CodecError::InvalidCommand { .. } => Self::InvalidCommand(err.to_string()),
            CodecError::MissingFields { .. } | CodecError::InvalidAddress { .. } => {
                Self::MalformedLine(err.to_string())
            }
        }
    }
}

impl From<crate::config::ConfigError> for ScanError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Serialize(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Write { path, source } => Self::ConfigParseError(format!(
                "Failed to write {}: {}",
                path.display(),
                source
            )),
            ConfigError::Validation { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
        }
    }
}

impl From<crate::session::RadioError> for ScanError {
    fn from(err: crate::session::RadioError) -> Self {
        use crate::session::RadioError;
        match err {
            RadioError::Unavailable { message } => Self::RadioUnavailable(message),
            RadioError::ScanFailed { message } => Self::RadioScanFailed(message),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};
    use std::time::Duration;

    #[test]
    fn test_transport_error_classification() {
        assert!(ScanError::TransportOpenFailed {
            port: "/dev/ttyUSB0".into(),
            reason: "No such file".into()
        }
        .is_transport_error());
        assert!(ScanError::TransportConfigFailed("tcsetattr".into()).is_transport_error());
        assert!(ScanError::CommandSendFailed("short write".into()).is_transport_error());
        assert!(ScanError::TransportIo(IoErr::new(ErrorKind::BrokenPipe, "gone")).is_transport_error());

        assert!(!ScanError::SessionTimeout { waited_secs: 15 }.is_transport_error());
    }

    #[test]
    fn test_timeout_is_distinct_from_transport_fault() {
        let timeout = ScanError::SessionTimeout { waited_secs: 15 };
        let io = ScanError::TransportIo(IoErr::new(ErrorKind::Other, "select"));

        assert!(timeout.is_timeout());
        assert!(!io.is_timeout());
        assert_ne!(timeout.exit_code(), io.exit_code());
        assert_ne!(timeout.error_code(), io.error_code());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(ScanError::MalformedLine("DEV,".into()).is_recoverable());
        assert!(ScanError::ScanAlreadyActive.is_recoverable());
        assert!(!ScanError::SessionTimeout { waited_secs: 1 }.is_recoverable());
        assert!(!ScanError::CommandSendFailed("x".into()).is_recoverable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            ScanError::InvalidScanTimeout {
                value: 10,
                min: 1000,
                max: 300_000
            }
            .exit_code(),
            2
        );
        assert_eq!(ScanError::CommandSendFailed("x".into()).exit_code(), 3);
        assert_eq!(ScanError::SessionTimeout { waited_secs: 1 }.exit_code(), 4);
        assert_eq!(ScanError::RadioUnavailable("none".into()).exit_code(), 5);
        assert_eq!(ScanError::ConfigNotFound(PathBuf::new()).exit_code(), 2);
    }

    #[test]
    fn test_from_frame_error() {
        let err: ScanError = crate::framer::FrameError::Timeout {
            elapsed: Duration::from_secs(12),
        }
        .into();
        assert!(matches!(err, ScanError::SessionTimeout { waited_secs: 12 }));

        let err: ScanError =
            crate::framer::FrameError::Io(IoErr::new(ErrorKind::UnexpectedEof, "closed")).into();
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_from_codec_error() {
        let err: ScanError = crate::codec::CodecError::MissingFields {
            line: "DEV,AA".into(),
        }
        .into();
        assert!(err.is_protocol_error());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_error_display_messages() {
        let err = ScanError::SessionTimeout { waited_secs: 20 };
        assert!(err.to_string().contains("Timeout waiting for scan completion"));

        let err = ScanError::TransportOpenFailed {
            port: "/dev/ttyACM0".into(),
            reason: "Permission denied".into(),
        };
        assert!(err.to_string().contains("/dev/ttyACM0"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ScanError>();
        assert_sync::<ScanError>();
    }
}
