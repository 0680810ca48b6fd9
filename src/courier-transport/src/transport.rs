//! Worker process lifecycle and request dispatch.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use courier_core::{HandshakeMode, MismatchPolicy, WorkerConfig};
use serde_json::Value;

use crate::channel::{LineReader, LineWriter};
use crate::consumer::Consumer;
use crate::error::{TransportError, TransportResult};
use crate::id::{IdGenerator, RequestId};
use crate::listener::{ListenerId, Listeners, NotificationListener};
use crate::protocol::{InboundMessage, RequestEnvelope};
use crate::reader::{Dispatcher, ResponseReader};
use crate::requests;
use crate::table::{CorrelationTable, PendingEntry};

const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(5);

/// Runtime knobs of a [`Transport`], independent of how the worker is
/// launched.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub handshake: HandshakeMode,
    pub handshake_event: String,
    pub handshake_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub mismatch_policy: MismatchPolicy,
    pub kill_on_drop: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for TransportOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            handshake: config.handshake,
            handshake_event: config.handshake_event.clone(),
            handshake_timeout: config.handshake_timeout(),
            request_timeout: config.request_timeout(),
            poll_interval: config.poll_interval(),
            mismatch_policy: config.mismatch_policy,
            kill_on_drop: config.kill_on_drop,
        }
    }
}

/// Client side of a worker conversation.
///
/// Requests may be dispatched from any number of threads; replies are read
/// and routed by a single background thread.
pub struct Transport {
    writer: LineWriter,
    ids: IdGenerator,
    table: Arc<CorrelationTable>,
    listeners: Arc<Listeners>,
    stop: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
    child: Option<Child>,
    request_timeout: Option<Duration>,
    kill_on_drop: bool,
}

impl Transport {
    /// Spawn `runtime_path script_path [args..]` and connect to it.
    pub fn start(config: &WorkerConfig) -> TransportResult<Self> {
        let (runtime, script) = config.command_paths()?;

        let mut cmd = Command::new(&runtime);
        cmd.arg(&script)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        if let Some(ref dir) = config.working_dir {
            cmd.current_dir(dir);
        }

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(TransportError::SpawnFailed)?;
        tracing::info!(
            runtime = %runtime.display(),
            script = %script.display(),
            pid = child.id(),
            "worker process started"
        );

        let stdin = child.stdin.take().ok_or(TransportError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(TransportError::NoStdout)?;

        match Self::connect(stdout, stdin, TransportOptions::from(config)) {
            Ok(mut transport) => {
                transport.child = Some(child);
                Ok(transport)
            }
            Err(err) => {
                tracing::warn!(error = %err, "worker failed to start; killing it");
                let _ = child.kill();
                let _ = child.wait();
                Err(err)
            }
        }
    }

    /// Run the transport over arbitrary streams: `reader` is what the
    /// worker writes, `writer` is what the worker reads.
    pub fn connect<R, W>(reader: R, writer: W, options: TransportOptions) -> TransportResult<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let mut lines = LineReader::spawn(reader)?;
        perform_handshake(&mut lines, &options)?;

        let table = Arc::new(CorrelationTable::new());
        let listeners = Arc::new(Listeners::new());
        let stop = Arc::new(AtomicBool::new(false));

        let dispatcher = Dispatcher::new(
            Arc::clone(&table),
            Arc::clone(&listeners),
            options.mismatch_policy,
        );
        let reader_task =
            ResponseReader::new(lines, dispatcher, Arc::clone(&stop), options.poll_interval)
                .spawn()?;

        Ok(Self {
            writer: LineWriter::new(writer),
            ids: IdGenerator::new(),
            table,
            listeners,
            stop,
            reader_task: Some(reader_task),
            child: None,
            request_timeout: options.request_timeout,
            kill_on_drop: options.kill_on_drop,
        })
    }

    /// Send one request.
    ///
    /// `build` receives the freshly generated id and produces the request;
    /// the envelope is always sent under that id.
    /// When a consumer is given it is registered before the request is
    /// written, so the reply can never arrive ahead of its entry. Without a
    /// consumer the request is fire-and-forget and any reply is discarded.
    pub fn dispatch<F>(&self, build: F, consumer: Option<Consumer>) -> TransportResult<RequestId>
    where
        F: FnOnce(&RequestId) -> RequestEnvelope,
    {
        let id = self.ids.next_id();
        let mut request = build(&id);
        // the table is keyed by `id`, so the wire id must match it
        request.id = id.to_string();
        let line = request.to_line()?;

        let expects_reply = consumer.is_some();
        if let Some(consumer) = consumer {
            let mut entry = PendingEntry::new(request.method.as_str(), consumer);
            if let Some(timeout) = self.request_timeout {
                entry = entry.with_deadline(Instant::now() + timeout);
            }
            self.table.register(id, entry)?;
        }

        if let Err(err) = self.writer.write_line(&line) {
            // the caller learns about the failure here, not through the consumer
            self.table.take(id);
            return Err(err);
        }

        tracing::debug!(%id, method = %request.method, expects_reply, "request sent");
        Ok(id)
    }

    /// Send `method` with optional `params`, delivering the raw result.
    pub fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        consumer: Option<Consumer>,
    ) -> TransportResult<RequestId> {
        self.dispatch(
            |id| {
                let request = RequestEnvelope::new(id, method);
                match params {
                    Some(params) => request.with_params(params),
                    None => request,
                }
            },
            consumer,
        )
    }

    /// Ask the worker to shut down. Does not wait for it to exit.
    pub fn shutdown(&self) -> TransportResult<RequestId> {
        tracing::info!("requesting worker shutdown");
        self.dispatch(requests::server_shutdown, None)
    }

    pub fn pending_count(&self) -> usize {
        self.table.len()
    }

    /// Whether requests are still outstanding.
    pub fn has_pending(&self) -> bool {
        !self.table.is_empty()
    }

    /// Wait until no request is outstanding. Returns `false` on timeout.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.table.is_empty() {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            thread::sleep(IDLE_CHECK_INTERVAL);
        }
    }

    /// `false` once the worker closed its output or the transport was closed.
    pub fn is_running(&self) -> bool {
        self.reader_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// OS process id of the worker, when this transport launched one.
    pub fn worker_pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Stop the reader, failing anything still pending.
    pub fn close(mut self) {
        self.stop_reader();
    }

    fn stop_reader(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(task) = self.reader_task.take() {
            if task.join().is_err() {
                tracing::warn!("response reader panicked");
            }
        }
        if let Some(mut child) = self.child.take() {
            if self.kill_on_drop {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

fn perform_handshake(lines: &mut LineReader, options: &TransportOptions) -> TransportResult<()> {
    match options.handshake {
        HandshakeMode::None => Ok(()),
        HandshakeMode::Discard => {
            let line = lines.read_first_line(options.handshake_timeout)?;
            tracing::debug!(line = %line, "discarded worker handshake");
            Ok(())
        }
        HandshakeMode::Validate => {
            let line = lines.read_first_line(options.handshake_timeout)?;
            validate_handshake(&line, &options.handshake_event)?;
            tracing::debug!(event = %options.handshake_event, "worker handshake accepted");
            Ok(())
        }
    }
}

fn validate_handshake(line: &str, expected: &str) -> TransportResult<()> {
    let rejected = |reason: String| TransportError::Handshake {
        line: line.to_string(),
        reason,
    };
    let message =
        InboundMessage::parse(line).ok_or_else(|| rejected("not a JSON object".to_string()))?;
    match message.event.as_deref() {
        Some(event) if event == expected => Ok(()),
        Some(event) => Err(rejected(format!(
            "expected event `{expected}`, got `{event}`"
        ))),
        None => Err(rejected(format!("expected event `{expected}`"))),
    }
}
