//! Newline framing over a polled byte transport.
//!
//! The consumer reads the producer's output one byte at a time, waiting at
//! most one poll interval per byte and at most the line deadline per line.
//! A line that outgrows the buffer is returned truncated; the bytes after the
//! cut begin the next line.

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::trace;

/// Default line buffer size, terminator slot included.
pub const DEFAULT_LINE_CAPACITY: usize = 256;

/// Default wait per byte.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A bidirectional byte stream with bounded waits.
pub trait Transport {
    /// Wait up to `wait` for one byte.
    ///
    /// `Ok(None)` means nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Any I/O failure, including the peer closing the stream.
    fn poll_byte(&mut self, wait: Duration) -> io::Result<Option<u8>>;

    /// Write all of `bytes`.
    ///
    /// # Errors
    ///
    /// Any I/O failure, including a short write.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn poll_byte(&mut self, wait: Duration) -> io::Result<Option<u8>> {
        (**self).poll_byte(wait)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send(bytes)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn poll_byte(&mut self, wait: Duration) -> io::Result<Option<u8>> {
        (**self).poll_byte(wait)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send(bytes)
    }
}

/// Errors produced while reading a line.
#[derive(Debug, Error)]
pub enum FrameError {
    /// No complete line arrived before the deadline.
    #[error("no complete line within {elapsed:?}")]
    Timeout {
        /// Time spent waiting for this line.
        elapsed: Duration,
    },

    /// The transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// One framed line, terminator removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Line text; invalid UTF-8 is replaced.
    pub text: String,
    /// Whether the line was cut at the buffer limit.
    pub truncated: bool,
}

impl Line {
    /// Whether the line has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Reads newline-terminated lines from a [`Transport`].
#[derive(Debug)]
pub struct LineFramer<T> {
    transport: T,
    capacity: usize,
    poll_interval: Duration,
}

impl<T: Transport> LineFramer<T> {
    /// Create a framer with the default capacity and poll interval.
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            capacity: DEFAULT_LINE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the line buffer size; lines hold at most `capacity - 1` bytes.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the per-byte wait.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Borrow the transport, e.g. to send a command.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Read one line.
    ///
    /// `\r` bytes are discarded. If `capacity - 1` bytes accumulate without a
    /// newline, they are returned with `truncated` set.
    ///
    /// # Errors
    ///
    /// [`FrameError::Timeout`] if `deadline` passes first, or
    /// [`FrameError::Io`] if the transport fails.
    pub fn read_line(&mut self, deadline: Duration) -> Result<Line, FrameError> {
        let limit = self.capacity.saturating_sub(1).max(1);
        let started = Instant::now();
        let mut buf = Vec::with_capacity(limit.min(DEFAULT_LINE_CAPACITY));

        loop {
            if buf.len() >= limit {
                trace!(len = buf.len(), "line truncated at buffer limit");
                return Ok(Self::finish(&buf, true));
            }

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                return Err(FrameError::Timeout { elapsed });
            }
            let wait = self.poll_interval.min(deadline - elapsed);

            match self.transport.poll_byte(wait)? {
                Some(b'\n') => return Ok(Self::finish(&buf, false)),
                Some(b'\r') | None => {}
                Some(byte) => buf.push(byte),
            }
        }
    }

    fn finish(buf: &[u8], truncated: bool) -> Line {
        Line {
            text: String::from_utf8_lossy(buf).into_owned(),
            truncated,
        }
    }
}

// ============================================================================
// In-memory transport
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Data(VecDeque<u8>),
    Silence(Duration),
}

/// Scripted transport for tests and offline replay.
///
/// The script is a sequence of byte runs and silences. Once exhausted the
/// transport either stays silent forever or, after [`hang_up`], reports
/// end-of-stream.
///
/// [`hang_up`]: MemoryTransport::hang_up
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    script: VecDeque<Step>,
    hung_up: bool,
    written: Vec<u8>,
}

impl MemoryTransport {
    /// Create an empty, silent transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be delivered.
    #[must_use]
    pub fn data(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.script
            .push_back(Step::Data(bytes.as_ref().iter().copied().collect()));
        self
    }

    /// Queue a period with no data.
    #[must_use]
    pub fn silence(mut self, duration: Duration) -> Self {
        self.script.push_back(Step::Silence(duration));
        self
    }

    /// Report end-of-stream once the script is exhausted.
    #[must_use]
    pub fn hang_up(mut self) -> Self {
        self.hung_up = true;
        self
    }

    /// Everything sent through this transport so far.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Transport for MemoryTransport {
    fn poll_byte(&mut self, wait: Duration) -> io::Result<Option<u8>> {
        loop {
            match self.script.front_mut() {
                Some(Step::Data(bytes)) => {
                    if let Some(byte) = bytes.pop_front() {
                        return Ok(Some(byte));
                    }
                    self.script.pop_front();
                }
                Some(Step::Silence(remaining)) => {
                    let slept = wait.min(*remaining);
                    std::thread::sleep(slept);
                    *remaining -= slept;
                    if remaining.is_zero() {
                        self.script.pop_front();
                    }
                    return Ok(None);
                }
                None if self.hung_up => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the stream",
                    ));
                }
                None => {
                    std::thread::sleep(wait);
                    return Ok(None);
                }
            }
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(5);
    const LONG: Duration = Duration::from_secs(5);

    fn framer(transport: MemoryTransport) -> LineFramer<MemoryTransport> {
        LineFramer::new(transport).with_poll_interval(SHORT)
    }

    #[test]
    fn test_reads_consecutive_lines() {
        let mut f = framer(MemoryTransport::new().data("DEV,a\nEND\n"));
        assert_eq!(f.read_line(LONG).unwrap().text, "DEV,a");
        assert_eq!(f.read_line(LONG).unwrap().text, "END");
    }

    #[test]
    fn test_carriage_returns_are_dropped() {
        let mut f = framer(MemoryTransport::new().data("EN\rD\r\n"));
        assert_eq!(f.read_line(LONG).unwrap().text, "END");
    }

    #[test]
    fn test_empty_line() {
        let mut f = framer(MemoryTransport::new().data("\r\n"));
        assert!(f.read_line(LONG).unwrap().is_empty());
    }

    #[test]
    fn test_line_split_across_silence() {
        let transport = MemoryTransport::new()
            .data("DEV,AA")
            .silence(Duration::from_millis(20))
            .data(":BB\n");
        let mut f = framer(transport);
        assert_eq!(f.read_line(LONG).unwrap().text, "DEV,AA:BB");
    }

    #[test]
    fn test_overlong_line_is_truncated_and_continues() {
        let mut f = framer(MemoryTransport::new().data("abcdefgh\n")).with_capacity(4);

        let first = f.read_line(LONG).unwrap();
        assert_eq!(first.text, "abc");
        assert!(first.truncated);

        assert_eq!(f.read_line(LONG).unwrap().text, "def");
        let last = f.read_line(LONG).unwrap();
        assert_eq!(last.text, "gh");
        assert!(!last.truncated);
    }

    #[test]
    fn test_deadline_expires_on_silence() {
        let mut f = framer(MemoryTransport::new().data("partial"));
        let err = f.read_line(Duration::from_millis(30)).unwrap_err();
        match err {
            FrameError::Timeout { elapsed } => assert!(elapsed >= Duration::from_millis(30)),
            FrameError::Io(e) => panic!("unexpected I/O error: {e}"),
        }
    }

    #[test]
    fn test_deadline_bounds_a_long_poll_interval() {
        let mut f = LineFramer::new(MemoryTransport::new()).with_poll_interval(LONG);
        let started = Instant::now();
        assert!(f.read_line(Duration::from_millis(30)).is_err());
        assert!(started.elapsed() < LONG);
    }

    #[test]
    fn test_hang_up_is_io_error() {
        let mut f = framer(MemoryTransport::new().data("x").hang_up());
        assert!(matches!(f.read_line(LONG), Err(FrameError::Io(_))));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut f = framer(MemoryTransport::new().data(b"a\xFFb\n"));
        assert_eq!(f.read_line(LONG).unwrap().text, "a\u{FFFD}b");
    }

    #[test]
    fn test_send_is_recorded() {
        let mut f = framer(MemoryTransport::new());
        f.get_mut().send(b"SCAN 1000\n").unwrap();
        assert_eq!(f.into_inner().written(), b"SCAN 1000\n");
    }
}
