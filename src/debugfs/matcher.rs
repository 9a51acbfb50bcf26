//! Prompt detection over raw shell output.
//!
//! The editing shell prints free text and then its idle prompt; the prompt
//! is the only signal that a command finished. [`PromptMatcher`] scans for
//! a marker string byte by byte while undoing the shell's inline line
//! editing, and [`ResponseFraming`] decides which markers make up one
//! command turn.

use super::error::SessionError;
use super::stream::{ByteSource, NextByte};
use std::time::{Duration, Instant};
use tracing::trace;

/// Rolling single-pattern scan for a marker string.
///
/// On a mismatch the scan restarts at the beginning of the marker (it is
/// not KMP), so echoed text containing partial markers costs rescans but
/// never ends the scan early.
///
/// A carriage return right after a space is the shell blanking out the
/// character before it: the space and that character are removed from the
/// response and the scan position is rolled back to before them.
#[derive(Debug)]
pub struct PromptMatcher<'m> {
    marker: &'m [u8],
    cursor: usize,
    response: Vec<u8>,
    // Scan position after each byte of `response`, so a retraction can
    // restore it exactly.
    history: Vec<usize>,
}

impl<'m> PromptMatcher<'m> {
    pub fn new(marker: &'m str) -> Self {
        Self {
            marker: marker.as_bytes(),
            cursor: 0,
            response: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Feed one byte. Returns `true` once the marker has been seen.
    pub fn feed(&mut self, byte: u8) -> bool {
        if self.marker.is_empty() {
            return true;
        }

        if byte == b'\r' && self.response.last() == Some(&b' ') {
            self.retract();
            self.retract();
            return false;
        }

        self.cursor = if byte == self.marker[self.cursor] {
            self.cursor + 1
        } else if byte == self.marker[0] {
            1
        } else {
            0
        };
        self.response.push(byte);
        self.history.push(self.cursor);

        self.cursor == self.marker.len()
    }

    fn retract(&mut self) {
        self.response.pop();
        self.history.pop();
        self.cursor = self.history.last().copied().unwrap_or(0);
    }

    pub fn response(&self) -> &[u8] {
        &self.response
    }

    pub fn into_response(self) -> String {
        String::from_utf8_lossy(&self.response).into_owned()
    }
}

/// Read from `source` until `marker` has been seen.
///
/// Returns everything consumed, marker included. Fails with
/// [`SessionError::Timeout`] if the marker does not show up within
/// `timeout`, or [`SessionError::Closed`] if the output ends first.
pub fn read_until(
    source: &mut dyn ByteSource,
    marker: &str,
    timeout: Duration,
) -> Result<String, SessionError> {
    let deadline = Instant::now() + timeout;
    let mut matcher = PromptMatcher::new(marker);

    if marker.is_empty() {
        return Ok(String::new());
    }

    loop {
        match source.next_byte(deadline) {
            NextByte::Byte(b) => {
                if matcher.feed(b) {
                    let text = matcher.into_response();
                    trace!("read: {:?}", text);
                    return Ok(text);
                }
            }
            NextByte::Elapsed => {
                return Err(SessionError::Timeout {
                    marker: marker.to_string(),
                    timeout,
                    partial: matcher.into_response(),
                })
            }
            NextByte::Eof => {
                return Err(SessionError::Closed {
                    marker: marker.to_string(),
                    partial: matcher.into_response(),
                })
            }
        }
    }
}

/// How one command turn is delimited in the shell's output.
pub trait ResponseFraming: Send {
    /// Consume the output that precedes the first prompt after start-up.
    fn read_banner(
        &mut self,
        source: &mut dyn ByteSource,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, SessionError> {
        read_until(source, prompt, timeout)
    }

    /// Consume the output produced for `command` and return its result
    /// text, without the echo and without the trailing prompt.
    fn read_response(
        &mut self,
        source: &mut dyn ByteSource,
        command: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, SessionError>;
}

/// The shell echoes each command line before printing its result and the
/// next prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoFraming;

impl ResponseFraming for EchoFraming {
    fn read_response(
        &mut self,
        source: &mut dyn ByteSource,
        command: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, SessionError> {
        read_until(source, command, timeout)?;
        let text = read_until(source, prompt, timeout)?;
        Ok(strip_marker(text, prompt))
    }
}

/// The shell prints only the result and the next prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptFraming;

impl ResponseFraming for PromptFraming {
    fn read_response(
        &mut self,
        source: &mut dyn ByteSource,
        _command: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, SessionError> {
        let text = read_until(source, prompt, timeout)?;
        Ok(strip_marker(text, prompt))
    }
}

fn strip_marker(mut text: String, marker: &str) -> String {
    if text.ends_with(marker) {
        text.truncate(text.len() - marker.len());
    }
    text
}
