//! Byte-at-a-time access to a child's output.
//!
//! The shell's output has no framing, so readers consume it one byte at a
//! time and decide for themselves where a response ends. A blocking pipe
//! read cannot be bounded, so the pipe is drained by a reader thread and
//! the consumer waits on a channel with a deadline instead.

use std::collections::VecDeque;
use std::io::{Cursor, ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;
use tracing::debug;

/// Outcome of waiting for the next output byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextByte {
    Byte(u8),
    /// The output channel is closed and drained.
    Eof,
    /// The deadline passed before a byte arrived.
    Elapsed,
}

/// A source of output bytes that can be waited on with a deadline.
pub trait ByteSource {
    fn next_byte(&mut self, deadline: Instant) -> NextByte;
}

/// In-memory source, used to replay captured output.
impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {
    fn next_byte(&mut self, _deadline: Instant) -> NextByte {
        let pos = self.position() as usize;
        match self.get_ref().as_ref().get(pos) {
            Some(&b) => {
                self.set_position(pos as u64 + 1);
                NextByte::Byte(b)
            }
            None => NextByte::Eof,
        }
    }
}

/// Output of one or more pipes, merged into a single byte stream.
pub struct ChildByteStream {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl ChildByteStream {
    /// Start one reader thread per pipe. Chunks from all pipes arrive on
    /// the same channel in the order they were read.
    pub fn spawn<I>(readers: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Read + Send>>,
    {
        let (tx, rx) = mpsc::channel();
        for reader in readers {
            let tx = tx.clone();
            thread::spawn(move || pump(reader, tx));
        }
        Self {
            rx,
            pending: VecDeque::new(),
        }
    }
}

fn pump(mut reader: Box<dyn Read + Send>, tx: Sender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("shell output reader stopped: {}", e);
                break;
            }
        }
    }
}

impl ByteSource for ChildByteStream {
    fn next_byte(&mut self, deadline: Instant) -> NextByte {
        loop {
            if let Some(b) = self.pending.pop_front() {
                return NextByte::Byte(b);
            }
            let wait = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(wait) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => return NextByte::Elapsed,
                Err(RecvTimeoutError::Disconnected) => return NextByte::Eof,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_cursor_yields_bytes_then_eof() {
        let mut src = Cursor::new(b"ab".to_vec());
        assert_eq!(src.next_byte(soon()), NextByte::Byte(b'a'));
        assert_eq!(src.next_byte(soon()), NextByte::Byte(b'b'));
        assert_eq!(src.next_byte(soon()), NextByte::Eof);
    }

    #[test]
    fn test_child_stream_merges_readers() {
        let first: Box<dyn Read + Send> = Box::new(Cursor::new(b"xyz".to_vec()));
        let mut stream = ChildByteStream::spawn([first]);

        let mut got = Vec::new();
        loop {
            match stream.next_byte(soon()) {
                NextByte::Byte(b) => got.push(b),
                NextByte::Eof => break,
                NextByte::Elapsed => panic!("reader thread stalled"),
            }
        }
        assert_eq!(got, b"xyz");
    }

    #[test]
    fn test_child_stream_times_out_on_silence() {
        // Keep the sender alive so the channel never disconnects.
        let (_tx, rx) = mpsc::channel::<Vec<u8>>();
        let mut stream = ChildByteStream {
            rx,
            pending: VecDeque::new(),
        };
        let deadline = Instant::now() + Duration::from_millis(50);
        assert_eq!(stream.next_byte(deadline), NextByte::Elapsed);
    }
}
