//! # blescan-core
//!
//! Core protocol for the blescan BLE discovery system.
//!
//! A producer (the agent, next to the radio) scans in timed windows and
//! reports each window over a byte link as `DEV` lines closed by `END`. A
//! consumer (the client) sends `SCAN <ms>`, reads the lines back, merges them
//! by address and prints the result.
//!
//! This crate provides:
//! - Name sanitization and device records
//! - Address-keyed aggregation with best-signal merge
//! - The line codec and a deadline-bounded line framer
//! - Result rendering as table, CSV or JSON
//! - The producer-side scan session and its radio backends
//! - Layered configuration and a unified error type
//!
//! ## Architecture
//!
//! - [`sanitize`] - Raw advertisement names to protocol-safe text
//! - [`types`] - Addresses, sightings and device records
//! - [`aggregator`] - Deduplication keeping the strongest signal
//! - [`codec`] - `DEV` / `END` / `SCAN` line encoding and parsing
//! - [`framer`] - Byte transport trait and newline framing with deadlines
//! - [`presenter`] - Human and machine-readable output
//! - [`session`] - Scan window lifecycle on the producer
//! - [`bluetooth`] - BlueZ and scripted radio backends
//! - [`config`] - Defaults, TOML file and environment overrides
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod bluetooth;
pub mod codec;
pub mod config;
pub mod error;
pub mod framer;
pub mod presenter;
pub mod sanitize;
pub mod session;
pub mod types;

// Re-export primary types for convenience
pub use aggregator::{Aggregator, Outcome};
#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use bluetooth::MockRadio;
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluezRadio;
pub use bluetooth::{event_channel, EventReceiver, EventSender};
pub use codec::{parse_command, parse_line, Command, CodecError, Frame};
pub use config::{ConfigError, ConfigResult, Settings};
pub use error::{Result, ScanError};
pub use framer::{FrameError, Line, LineFramer, MemoryTransport, Transport};
pub use presenter::{OutputFormat, Presenter, ScanReport};
pub use sanitize::sanitize_name;
pub use session::{
    EmitMode, Radio, RadioError, RadioEvent, ScanSession, SessionOptions, SessionState,
    WindowSummary,
};
pub use types::{AdvertisementData, DeviceRecord, MacAddress, Sighting};
