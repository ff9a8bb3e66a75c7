//! # blescan-agent
//!
//! Producer side of the blescan system: reads `SCAN <ms>` commands, runs
//! scan windows on the local radio and streams each window's results as
//! `DEV` lines closed by `END`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod agent;
pub mod logging;

pub use agent::{Agent, Continuous};
