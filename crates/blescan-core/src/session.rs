//! Producer-side scan window orchestration.
//!
//! A [`ScanSession`] owns at most one window at a time. Radio events are fed
//! in serially through [`ScanSession::handle_event`]; when the window ends,
//! by completion or by an explicit stop (whichever comes first), the results
//! are written as `DEV` lines followed by exactly one `END`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use blescan_core::session::{Radio, RadioError, RadioEvent, ScanSession, SessionOptions};
//! use blescan_core::types::{MacAddress, Sighting};
//!
//! struct NullRadio;
//!
//! impl Radio for NullRadio {
//!     fn start_scan(&mut self, _window: Duration) -> Result<(), RadioError> { Ok(()) }
//!     fn stop_scan(&mut self) -> Result<(), RadioError> { Ok(()) }
//! }
//!
//! let mut session = ScanSession::new(NullRadio, Vec::new(), SessionOptions::default());
//! session.start(Duration::from_secs(5)).unwrap();
//! let sighting = Sighting::new(MacAddress::new([1, 2, 3, 4, 5, 6]), -60, None);
//! session.handle_event(RadioEvent::Sighting(sighting)).unwrap();
//! session.handle_event(RadioEvent::WindowComplete).unwrap();
//!
//! assert_eq!(session.output(), b"DEV,01:02:03:04:05:06,-60,\nEND\n");
//! ```

use std::io::Write;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::aggregator::{Aggregator, Outcome, DEFAULT_INITIAL_CAPACITY};
use crate::codec::{write_device, write_end};
use crate::error::{Result, ScanError};
use crate::types::{DeviceRecord, Sighting, PRODUCER_NAME_CAPACITY};

/// Errors reported by a radio backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    /// No usable adapter.
    #[error("radio unavailable: {message}")]
    Unavailable {
        /// Backend detail.
        message: String,
    },

    /// The adapter refused to start or stop scanning.
    #[error("scan failed: {message}")]
    ScanFailed {
        /// Backend detail.
        message: String,
    },
}

/// The scanning backend a session drives.
///
/// Implementations deliver their results asynchronously as [`RadioEvent`]s,
/// which the owner of the session passes to [`ScanSession::handle_event`].
pub trait Radio {
    /// Begin a timed scan lasting `window`.
    ///
    /// # Errors
    ///
    /// Returns a [`RadioError`] if the scan could not be started.
    fn start_scan(&mut self, window: Duration) -> std::result::Result<(), RadioError>;

    /// End the current scan early.
    ///
    /// # Errors
    ///
    /// Returns a [`RadioError`] if the backend could not stop.
    fn stop_scan(&mut self) -> std::result::Result<(), RadioError>;
}

impl<R: Radio + ?Sized> Radio for Box<R> {
    fn start_scan(&mut self, window: Duration) -> std::result::Result<(), RadioError> {
        (**self).start_scan(window)
    }

    fn stop_scan(&mut self) -> std::result::Result<(), RadioError> {
        (**self).stop_scan()
    }
}

/// An event from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// One advertisement was received.
    Sighting(Sighting),
    /// The timed window ran out.
    WindowComplete,
    /// The window was ended early.
    WindowStopped,
}

/// When `DEV` lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmitMode {
    /// Deduplicate and sort, then write everything at window end.
    #[default]
    Aggregated,
    /// Write every sighting as it arrives; the consumer deduplicates.
    Passthrough,
}

impl std::str::FromStr for EmitMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aggregated" => Ok(Self::Aggregated),
            "passthrough" => Ok(Self::Passthrough),
            other => Err(format!(
                "unknown emit mode '{other}' (expected aggregated or passthrough)"
            )),
        }
    }
}

/// Tunables for a [`ScanSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Name buffer size, terminator included.
    pub name_capacity: usize,
    /// Most distinct devices kept per window.
    pub max_devices: Option<usize>,
    /// Weakest signal reported.
    pub min_rssi: Option<i32>,
    /// When results are written.
    pub emit_mode: EmitMode,
    /// Initial aggregator capacity.
    pub initial_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name_capacity: PRODUCER_NAME_CAPACITY,
            max_devices: None,
            min_rssi: None,
            emit_mode: EmitMode::Aggregated,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

impl SessionOptions {
    fn passes(&self, record: &DeviceRecord) -> bool {
        self.min_rssi
            .map_or(true, |min| record.signal_strength >= min)
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No window open.
    Idle,
    /// A window is collecting sightings.
    Scanning,
}

/// How a window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowEnd {
    /// The radio's timer ran out.
    Completed,
    /// The window was stopped early.
    Stopped,
}

/// Statistics for one finished window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSummary {
    /// Window identifier, also recorded on its log span.
    pub id: Uuid,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Time from start to drain.
    pub elapsed: Duration,
    /// Sightings received.
    pub sightings: usize,
    /// Distinct addresses kept.
    pub unique_devices: usize,
    /// `DEV` lines written.
    pub reported: usize,
    /// How the window ended.
    pub ended_by: WindowEnd,
}

#[derive(Debug)]
struct ScanWindow {
    id: Uuid,
    started: Instant,
    started_at: DateTime<Utc>,
    duration: Duration,
    aggregator: Aggregator,
    sightings: usize,
    reported: usize,
}

/// Round a requested window up to whole seconds, at least one.
#[must_use]
pub fn window_secs(requested: Duration) -> u64 {
    let secs = requested.as_secs() + u64::from(requested.subsec_nanos() > 0);
    secs.max(1)
}

/// Drives one radio and writes protocol lines to `W`.
#[derive(Debug)]
pub struct ScanSession<R, W> {
    radio: R,
    out: W,
    options: SessionOptions,
    window: Option<ScanWindow>,
}

impl<R: Radio, W: Write> ScanSession<R, W> {
    /// Create an idle session.
    pub const fn new(radio: R, out: W, options: SessionOptions) -> Self {
        Self {
            radio,
            out,
            options,
            window: None,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        if self.window.is_some() {
            SessionState::Scanning
        } else {
            SessionState::Idle
        }
    }

    /// The options this session was created with.
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Open a window and start the radio.
    ///
    /// The radio is asked for [`window_secs`] whole seconds.
    ///
    /// # Errors
    ///
    /// [`ScanError::ScanAlreadyActive`] if a window is open, or a radio error
    /// if the scan could not start; the session stays idle in both cases.
    pub fn start(&mut self, requested: Duration) -> Result<Uuid> {
        if self.window.is_some() {
            return Err(ScanError::ScanAlreadyActive);
        }

        let duration = Duration::from_secs(window_secs(requested));
        let id = Uuid::new_v4();
        let span = info_span!("scan_window", window_id = %id);
        let _guard = span.enter();

        self.radio.start_scan(duration)?;

        info!(
            requested_ms = requested.as_millis(),
            duration_secs = duration.as_secs(),
            "Scan window started"
        );
        self.window = Some(ScanWindow {
            id,
            started: Instant::now(),
            started_at: Utc::now(),
            duration,
            aggregator: Aggregator::with_capacity(self.options.initial_capacity)
                .with_ceiling(self.options.max_devices),
            sightings: 0,
            reported: 0,
        });
        Ok(id)
    }

    /// Ask the radio to end the current window early.
    ///
    /// The drain happens when the resulting [`RadioEvent::WindowStopped`]
    /// (or a racing [`RadioEvent::WindowComplete`]) is handled.
    ///
    /// # Errors
    ///
    /// Propagates radio failures.
    pub fn stop(&mut self) -> Result<()> {
        if self.window.is_none() {
            debug!("stop requested while idle");
            return Ok(());
        }
        self.radio.stop_scan()?;
        Ok(())
    }

    /// Process one radio event.
    ///
    /// Returns a summary when this event closed a window.
    ///
    /// # Errors
    ///
    /// [`ScanError::TransportIo`] if writing to the output fails.
    pub fn handle_event(&mut self, event: RadioEvent) -> Result<Option<WindowSummary>> {
        match event {
            RadioEvent::Sighting(sighting) => {
                self.record(&sighting)?;
                Ok(None)
            }
            RadioEvent::WindowComplete => self.finish(WindowEnd::Completed),
            RadioEvent::WindowStopped => self.finish(WindowEnd::Stopped),
        }
    }

    fn record(&mut self, sighting: &Sighting) -> Result<()> {
        let Some(window) = self.window.as_mut() else {
            debug!(address = %sighting.address, "sighting outside a scan window");
            return Ok(());
        };
        window.sightings += 1;

        let record = DeviceRecord::from_sighting(sighting, self.options.name_capacity);
        let forward = (self.options.emit_mode == EmitMode::Passthrough
            && self.options.passes(&record))
        .then(|| record.clone());

        if window.aggregator.add_or_update(record) == Outcome::Dropped {
            return Ok(());
        }
        if let Some(record) = forward {
            write_device(&mut self.out, &record)?;
            self.out.flush()?;
            window.reported += 1;
        }
        Ok(())
    }

    fn finish(&mut self, ended_by: WindowEnd) -> Result<Option<WindowSummary>> {
        let Some(window) = self.window.take() else {
            debug!(?ended_by, "window already drained");
            return Ok(None);
        };
        let span = info_span!("scan_window", window_id = %window.id);
        let _guard = span.enter();

        let unique_devices = window.aggregator.len();
        let mut reported = window.reported;
        if self.options.emit_mode == EmitMode::Aggregated {
            for record in window.aggregator.drain_sorted() {
                if self.options.passes(&record) {
                    write_device(&mut self.out, &record)?;
                    reported += 1;
                }
            }
        }
        write_end(&mut self.out)?;
        self.out.flush()?;

        let elapsed = window.started.elapsed();
        if ended_by == WindowEnd::Stopped && elapsed < window.duration {
            warn!(elapsed_ms = elapsed.as_millis(), "Scan window ended early");
        }
        info!(
            sightings = window.sightings,
            unique_devices,
            reported,
            ?ended_by,
            "Scan window finished"
        );

        Ok(Some(WindowSummary {
            id: window.id,
            started_at: window.started_at,
            elapsed,
            sightings: window.sightings,
            unique_devices,
            reported,
            ended_by,
        }))
    }

    /// The output sink.
    pub const fn output(&self) -> &W {
        &self.out
    }

    /// The radio backend.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Release the radio and output.
    pub fn into_parts(self) -> (R, W) {
        (self.radio, self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MacAddress;

    #[derive(Debug, Default)]
    struct RecordingRadio {
        started: Vec<Duration>,
        stops: usize,
        fail_start: bool,
    }

    impl Radio for RecordingRadio {
        fn start_scan(&mut self, window: Duration) -> std::result::Result<(), RadioError> {
            if self.fail_start {
                return Err(RadioError::ScanFailed {
                    message: "busy".into(),
                });
            }
            self.started.push(window);
            Ok(())
        }

        fn stop_scan(&mut self) -> std::result::Result<(), RadioError> {
            self.stops += 1;
            Ok(())
        }
    }

    fn sighting(last: u8, rssi: i16, name: Option<&[u8]>) -> RadioEvent {
        RadioEvent::Sighting(Sighting::new(
            MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last]),
            rssi,
            name.map(<[u8]>::to_vec),
        ))
    }

    fn session(options: SessionOptions) -> ScanSession<RecordingRadio, Vec<u8>> {
        ScanSession::new(RecordingRadio::default(), Vec::new(), options)
    }

    fn text(session: &ScanSession<RecordingRadio, Vec<u8>>) -> &str {
        std::str::from_utf8(session.output()).unwrap()
    }

    #[test]
    fn test_window_drains_sorted_with_end() {
        let mut s = session(SessionOptions::default());
        s.start(Duration::from_secs(5)).unwrap();
        assert_eq!(s.state(), SessionState::Scanning);

        s.handle_event(sighting(1, -82, None)).unwrap();
        s.handle_event(sighting(1, -65, Some(b"Tag1"))).unwrap();
        s.handle_event(sighting(2, -50, None)).unwrap();
        let summary = s.handle_event(RadioEvent::WindowComplete).unwrap().unwrap();

        assert_eq!(
            text(&s),
            "DEV,AA:BB:CC:DD:EE:02,-50,\nDEV,AA:BB:CC:DD:EE:01,-65,Tag1\nEND\n"
        );
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(summary.sightings, 3);
        assert_eq!(summary.unique_devices, 2);
        assert_eq!(summary.reported, 2);
        assert_eq!(summary.ended_by, WindowEnd::Completed);
    }

    #[test]
    fn test_empty_window_emits_only_end() {
        let mut s = session(SessionOptions::default());
        s.start(Duration::from_secs(1)).unwrap();
        s.handle_event(RadioEvent::WindowComplete).unwrap();
        assert_eq!(text(&s), "END\n");
    }

    #[test]
    fn test_stop_and_complete_race_yields_one_end() {
        let mut s = session(SessionOptions::default());
        s.start(Duration::from_secs(5)).unwrap();
        s.handle_event(sighting(1, -60, None)).unwrap();
        s.stop().unwrap();

        let first = s.handle_event(RadioEvent::WindowStopped).unwrap();
        let second = s.handle_event(RadioEvent::WindowComplete).unwrap();

        assert_eq!(first.unwrap().ended_by, WindowEnd::Stopped);
        assert!(second.is_none());
        assert_eq!(text(&s).matches("END\n").count(), 1);
        assert_eq!(s.radio_mut().stops, 1);
    }

    #[test]
    fn test_overlapping_start_is_rejected() {
        let mut s = session(SessionOptions::default());
        s.start(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            s.start(Duration::from_secs(5)),
            Err(ScanError::ScanAlreadyActive)
        ));
        assert_eq!(s.radio_mut().started.len(), 1);
    }

    #[test]
    fn test_radio_failure_leaves_session_idle() {
        let mut s = ScanSession::new(
            RecordingRadio {
                fail_start: true,
                ..RecordingRadio::default()
            },
            Vec::new(),
            SessionOptions::default(),
        );
        let err = s.start(Duration::from_secs(5)).unwrap_err();
        assert!(err.is_radio_error());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.output().is_empty());
    }

    #[test]
    fn test_sightings_outside_window_are_ignored() {
        let mut s = session(SessionOptions::default());
        s.handle_event(sighting(1, -60, None)).unwrap();
        assert!(s.handle_event(RadioEvent::WindowComplete).unwrap().is_none());
        assert!(s.output().is_empty());
    }

    #[test]
    fn test_fresh_aggregator_per_window() {
        let mut s = session(SessionOptions::default());
        s.start(Duration::from_secs(1)).unwrap();
        s.handle_event(sighting(1, -40, None)).unwrap();
        s.handle_event(RadioEvent::WindowComplete).unwrap();

        s.start(Duration::from_secs(1)).unwrap();
        s.handle_event(sighting(2, -70, None)).unwrap();
        s.handle_event(RadioEvent::WindowComplete).unwrap();

        assert_eq!(
            text(&s),
            "DEV,AA:BB:CC:DD:EE:01,-40,\nEND\nDEV,AA:BB:CC:DD:EE:02,-70,\nEND\n"
        );
    }

    #[test]
    fn test_min_rssi_and_ceiling() {
        let mut s = session(SessionOptions {
            min_rssi: Some(-85),
            max_devices: Some(2),
            ..SessionOptions::default()
        });
        s.start(Duration::from_secs(1)).unwrap();
        s.handle_event(sighting(1, -90, None)).unwrap();
        s.handle_event(sighting(2, -60, None)).unwrap();
        s.handle_event(sighting(3, -10, None)).unwrap();
        let summary = s.handle_event(RadioEvent::WindowComplete).unwrap().unwrap();

        assert_eq!(text(&s), "DEV,AA:BB:CC:DD:EE:02,-60,\nEND\n");
        assert_eq!(summary.unique_devices, 2);
        assert_eq!(summary.reported, 1);
    }

    #[test]
    fn test_names_are_sanitized_to_producer_capacity() {
        let mut s = session(SessionOptions::default());
        s.start(Duration::from_secs(1)).unwrap();
        let long = [b'x'; 80];
        s.handle_event(sighting(1, -60, Some(b"a,b\xE2\x82\xAC"))).unwrap();
        s.handle_event(sighting(2, -70, Some(&long))).unwrap();
        s.handle_event(RadioEvent::WindowComplete).unwrap();

        let out = text(&s);
        assert!(out.contains("DEV,AA:BB:CC:DD:EE:01,-60,a b\n"));
        assert!(out.contains(&format!("DEV,AA:BB:CC:DD:EE:02,-70,{}\n", "x".repeat(31))));
    }

    #[test]
    fn test_passthrough_forwards_raw_sightings() {
        let mut s = session(SessionOptions {
            emit_mode: EmitMode::Passthrough,
            ..SessionOptions::default()
        });
        s.start(Duration::from_secs(1)).unwrap();
        s.handle_event(sighting(1, -82, None)).unwrap();
        s.handle_event(sighting(1, -65, Some(b"Tag1"))).unwrap();
        s.handle_event(sighting(2, -50, None)).unwrap();
        let summary = s.handle_event(RadioEvent::WindowComplete).unwrap().unwrap();

        assert_eq!(
            text(&s),
            "DEV,AA:BB:CC:DD:EE:01,-82,\n\
             DEV,AA:BB:CC:DD:EE:01,-65,Tag1\n\
             DEV,AA:BB:CC:DD:EE:02,-50,\n\
             END\n"
        );
        assert_eq!(summary.reported, 3);
        assert_eq!(summary.unique_devices, 2);
    }

    #[test]
    fn test_emit_mode_parsing() {
        assert_eq!("passthrough".parse::<EmitMode>(), Ok(EmitMode::Passthrough));
        assert_eq!("Aggregated".parse::<EmitMode>(), Ok(EmitMode::Aggregated));
        assert!("raw".parse::<EmitMode>().is_err());
    }

    #[test]
    fn test_window_secs_rounds_up() {
        assert_eq!(window_secs(Duration::from_millis(10_000)), 10);
        assert_eq!(window_secs(Duration::from_millis(1500)), 2);
        assert_eq!(window_secs(Duration::from_millis(1)), 1);
        assert_eq!(window_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_radio_receives_rounded_window() {
        let mut s = session(SessionOptions::default());
        s.start(Duration::from_millis(2500)).unwrap();
        assert_eq!(s.radio_mut().started, vec![Duration::from_secs(3)]);
    }
}
