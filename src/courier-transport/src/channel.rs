//! Line-oriented access to the worker's stdin and stdout.
//!
//! Writing is synchronous and serialized so two callers never interleave
//! bytes of different requests. Reading happens on a pump thread that does
//! blocking `read_line` calls and queues complete lines; consumers of the
//! queue either drain what is already there or wait with a timeout.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::error::{TransportError, TransportResult};
use crate::lock;

/// Write half of the channel.
pub struct LineWriter {
    inner: Mutex<BufWriter<Box<dyn Write + Send>>>,
}

impl LineWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Mutex::new(BufWriter::new(Box::new(writer))),
        }
    }

    /// Write `text` followed by a newline and flush immediately.
    pub fn write_line(&self, text: &str) -> TransportResult<()> {
        debug_assert!(!text.contains('\n'), "a request must fit on one line");
        let mut writer = lock(&self.inner);
        writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .map_err(TransportError::WriteFailed)
    }
}

enum LineEvent {
    Line(String),
    Closed,
}

/// What one call to [`LineReader::next_batch`] observed.
#[derive(Debug, PartialEq, Eq)]
pub enum LineBatch {
    /// At least one complete line.
    Lines(Vec<String>),
    /// Nothing arrived within the wait.
    Idle,
    /// The stream hit EOF or failed; no more lines will arrive.
    Closed,
}

/// Read half of the channel.
pub struct LineReader {
    rx: Receiver<LineEvent>,
    closed: bool,
}

impl LineReader {
    /// Start the pump thread over `reader`.
    ///
    /// The pump owns the stream and stays blocked in `read_line` until the
    /// worker writes or closes its stdout, so it is detached rather than
    /// joined.
    pub fn spawn<R: Read + Send + 'static>(reader: R) -> TransportResult<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("courier-stdout".into())
            .spawn(move || pump(BufReader::new(reader), tx))
            .map_err(TransportError::ThreadSpawn)?;
        Ok(Self { rx, closed: false })
    }

    /// Complete lines already received, without blocking. Empty when none
    /// are ready.
    pub fn poll_available_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while !self.closed {
            match self.rx.try_recv() {
                Ok(LineEvent::Line(line)) => lines.push(line),
                Ok(LineEvent::Closed) | Err(TryRecvError::Disconnected) => self.closed = true,
                Err(TryRecvError::Empty) => break,
            }
        }
        lines
    }

    /// Wait up to `wait` for a line, then drain whatever else is ready.
    pub fn next_batch(&mut self, wait: Duration) -> LineBatch {
        if self.closed {
            return LineBatch::Closed;
        }
        match self.rx.recv_timeout(wait) {
            Ok(LineEvent::Line(first)) => {
                let mut lines = vec![first];
                lines.extend(self.poll_available_lines());
                LineBatch::Lines(lines)
            }
            Ok(LineEvent::Closed) | Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                LineBatch::Closed
            }
            Err(RecvTimeoutError::Timeout) => LineBatch::Idle,
        }
    }

    /// Block for exactly one line. Used for the startup handshake.
    pub fn read_first_line(&mut self, wait: Duration) -> TransportResult<String> {
        if self.closed {
            return Err(TransportError::WorkerExited);
        }
        match self.rx.recv_timeout(wait) {
            Ok(LineEvent::Line(line)) => Ok(line),
            Ok(LineEvent::Closed) | Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                Err(TransportError::WorkerExited)
            }
            Err(RecvTimeoutError::Timeout) => Err(TransportError::HandshakeTimeout(wait)),
        }
    }
}

fn pump<R: BufRead>(mut reader: R, tx: Sender<LineEvent>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                tracing::debug!("worker stdout reached EOF");
                break;
            }
            Ok(_) => {
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line.trim_end(),
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            bytes = buf.len(),
                            "skipping non-UTF-8 line from worker"
                        );
                        continue;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                if tx.send(LineEvent::Line(line.to_string())).is_err() {
                    // reader side dropped; nobody is listening any more
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read from worker stdout");
                break;
            }
        }
    }
    let _ = tx.send(LineEvent::Closed);
}
