//! # blescan-client
//!
//! Consumer side of the blescan system: sends `SCAN <ms>` to an agent over a
//! serial link, reads the `DEV` lines back until `END`, merges them by
//! address and renders the result.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod cli;
pub mod client;
pub mod logging;
pub mod serial;

pub use client::{ScanClient, ScanOutcome, ScanStats};
pub use serial::SerialTransport;
