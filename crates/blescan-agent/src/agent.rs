//! The producer event loop.
//!
//! One task owns the [`ScanSession`] and multiplexes three inputs:
//!
//! - command lines (`SCAN <ms>`) from the link
//! - radio events from the backend's channel
//! - the cooldown timer between continuous windows
//!
//! Events therefore reach the session serially, and a window is drained
//! exactly once.

use std::io::Write;
use std::time::Duration;

use blescan_core::bluetooth::EventReceiver;
use blescan_core::codec::{parse_command, Command};
use blescan_core::config::{ScanLimits, Settings};
use blescan_core::error::ScanError;
use blescan_core::session::{Radio, ScanSession, SessionState};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Back-to-back scanning without commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuous {
    /// Length of each window.
    pub window: Duration,
    /// Pause after each window.
    pub cooldown: Duration,
}

/// Drives a [`ScanSession`] from commands and radio events.
#[derive(Debug)]
pub struct Agent<R, W> {
    session: ScanSession<R, W>,
    events: EventReceiver,
    limits: ScanLimits,
    continuous: Option<Continuous>,
    max_windows: Option<usize>,
    windows: usize,
}

impl<R: Radio, W: Write> Agent<R, W> {
    /// Create an agent that scans on command only.
    pub const fn new(session: ScanSession<R, W>, events: EventReceiver, limits: ScanLimits) -> Self {
        Self {
            session,
            events,
            limits,
            continuous: None,
            max_windows: None,
            windows: 0,
        }
    }

    /// Create an agent from loaded settings.
    pub fn from_settings(
        radio: R,
        out: W,
        events: EventReceiver,
        settings: &Settings,
    ) -> Self {
        let options = settings
            .agent
            .session_options(settings.aggregator.initial_capacity);
        let agent = Self::new(
            ScanSession::new(radio, out, options),
            events,
            settings.scan.clone(),
        );
        if settings.agent.continuous {
            agent.with_continuous(Some(Continuous {
                window: settings.agent.window(),
                cooldown: settings.agent.cooldown(),
            }))
        } else {
            agent
        }
    }

    /// Enable or disable continuous scanning.
    #[must_use]
    pub fn with_continuous(mut self, continuous: Option<Continuous>) -> Self {
        self.continuous = continuous;
        self
    }

    /// Exit after this many windows.
    #[must_use]
    pub fn with_max_windows(mut self, max_windows: Option<usize>) -> Self {
        self.max_windows = max_windows;
        self
    }

    /// The session being driven.
    pub const fn session(&self) -> &ScanSession<R, W> {
        &self.session
    }

    /// Run until done.
    ///
    /// Without continuous mode the agent stops once `commands` is exhausted
    /// and no window is open. With it, the agent runs until the window limit
    /// is reached, if any.
    ///
    /// Returns the number of windows completed.
    ///
    /// # Errors
    ///
    /// [`ScanError::TransportIo`] if results cannot be written, or
    /// [`ScanError::RadioUnavailable`] if the radio's event channel closes.
    pub async fn run<C>(&mut self, commands: C) -> Result<usize, ScanError>
    where
        C: AsyncBufRead + Unpin,
    {
        let mut lines = commands.lines();
        let mut commands_open = true;
        let mut next_window = self.continuous.map(|_| Instant::now());

        info!(continuous = self.continuous.is_some(), "Agent ready");

        loop {
            if self.limit_reached() && self.idle() {
                info!(windows = self.windows, "Window limit reached");
                break;
            }
            if !commands_open && self.continuous.is_none() && self.idle() {
                info!(windows = self.windows, "Command input closed, exiting");
                break;
            }

            let wake = next_window.unwrap_or_else(Instant::now);
            let timer_armed = next_window.is_some() && self.idle();

            tokio::select! {
                line = lines.next_line(), if commands_open => match line {
                    Ok(Some(line)) => self.handle_command(&line),
                    Ok(None) => {
                        debug!("command input closed");
                        commands_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read command input");
                        commands_open = false;
                    }
                },
                event = self.events.recv() => {
                    let Some(event) = event else {
                        error!("Radio event channel closed");
                        return Err(ScanError::RadioUnavailable("event channel closed".into()));
                    };
                    if let Some(summary) = self.session.handle_event(event)? {
                        self.windows += 1;
                        info!(
                            window_id = %summary.id,
                            reported = summary.reported,
                            elapsed_ms = summary.elapsed.as_millis(),
                            "Results sent"
                        );
                        if let Some(continuous) = self.continuous {
                            next_window = Some(Instant::now() + continuous.cooldown);
                        }
                    }
                },
                () = sleep_until(wake), if timer_armed => {
                    next_window = None;
                    if let Some(continuous) = self.continuous {
                        if !self.limit_reached() && !self.start_window(continuous.window) {
                            next_window = Some(Instant::now() + continuous.cooldown);
                        }
                    }
                },
            }
        }

        Ok(self.windows)
    }

    fn idle(&self) -> bool {
        self.session.state() == SessionState::Idle
    }

    fn limit_reached(&self) -> bool {
        self.max_windows.is_some_and(|max| self.windows >= max)
    }

    fn handle_command(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match parse_command(line) {
            Ok(Command::Scan { timeout_ms }) => match self.limits.check(timeout_ms) {
                Ok(timeout_ms) => {
                    self.start_window(Duration::from_millis(u64::from(timeout_ms)));
                }
                Err(e) => warn!(error = %e, "Rejecting scan command"),
            },
            Err(e) => warn!(error = %e, "Ignoring invalid command"),
        }
    }

    /// Returns whether a window was opened.
    fn start_window(&mut self, window: Duration) -> bool {
        match self.session.start(window) {
            Ok(_) => true,
            Err(ScanError::ScanAlreadyActive) => {
                warn!("Scan already in progress, ignoring request");
                false
            }
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Failed to start scan");
                false
            }
        }
    }

    /// Release the session.
    pub fn into_session(self) -> ScanSession<R, W> {
        self.session
    }
}
