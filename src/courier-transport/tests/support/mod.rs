//! In-memory stand-in for a worker process.

#![allow(dead_code)]

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use courier_core::HandshakeMode;
use courier_transport::{Transport, TransportOptions};
use serde_json::Value;

pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buf.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel();
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            buf: Vec::new(),
            pos: 0,
        },
    )
}

/// The worker end of a connected transport.
pub struct FakeWorker {
    to_client: Option<PipeWriter>,
    from_client: BufReader<PipeReader>,
}

impl FakeWorker {
    pub fn send(&mut self, line: &str) {
        let writer = self.to_client.as_mut().expect("worker output already closed");
        writer.write_all(line.as_bytes()).unwrap();
        writer.write_all(b"\n").unwrap();
    }

    /// Write raw bytes, newline included by the caller.
    pub fn send_bytes(&mut self, bytes: &[u8]) {
        let writer = self.to_client.as_mut().expect("worker output already closed");
        writer.write_all(bytes).unwrap();
    }

    /// Next request line written by the client, parsed.
    pub fn next_request(&mut self) -> Value {
        let mut line = String::new();
        let read = self.from_client.read_line(&mut line).unwrap();
        assert!(read > 0, "client closed its side");
        serde_json::from_str(line.trim_end()).expect("client wrote invalid JSON")
    }

    /// Simulate the worker exiting.
    pub fn close_output(&mut self) {
        self.to_client = None;
    }
}

pub fn options() -> TransportOptions {
    TransportOptions {
        handshake: HandshakeMode::Validate,
        poll_interval: Duration::from_millis(10),
        ..TransportOptions::default()
    }
}

/// Connect a transport to a fake worker that has already announced itself.
pub fn connect(options: TransportOptions) -> (Transport, FakeWorker) {
    let (to_client, client_stdout) = pipe();
    let (client_stdin, from_client) = pipe();
    let mut worker = FakeWorker {
        to_client: Some(to_client),
        from_client: BufReader::new(from_client),
    };
    if options.handshake != HandshakeMode::None {
        worker.send(r#"{"event":"server.connected","params":{"version":"1.2.3"}}"#);
    }
    let transport =
        Transport::connect(client_stdout, client_stdin, options).expect("transport should connect");
    (transport, worker)
}

pub fn request_id(request: &Value) -> String {
    request["id"].as_str().expect("request id is a string").to_string()
}
