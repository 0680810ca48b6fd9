//! The response reader: drains worker output and completes consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use courier_core::MismatchPolicy;

use crate::channel::{LineBatch, LineReader};
use crate::contain_panic;
use crate::consumer::{Completion, ConsumerKind};
use crate::error::{RequestError, TransportError, TransportResult};
use crate::id::RequestId;
use crate::listener::Listeners;
use crate::protocol::InboundMessage;
use crate::table::CorrelationTable;

/// How a single inbound line was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not a JSON object; skipped.
    Malformed,
    /// No `id`. `delivered` counts the listeners that saw it.
    Notification { event: Option<String>, delivered: usize },
    /// The id is not pending: never sent, already answered, or sent
    /// fire-and-forget.
    Unmatched { id: String },
    /// The consumer was invoked with a result or a decode error.
    Completed { id: RequestId, kind: ConsumerKind },
    /// The consumer was invoked with the worker's error payload.
    Failed { id: RequestId, kind: ConsumerKind },
    /// The result did not decode and was dropped by policy.
    Dropped { id: RequestId, kind: ConsumerKind },
    /// The consumer panicked. The entry is gone and the reader carries on.
    Panicked { id: RequestId, kind: ConsumerKind },
}

/// Routes parsed lines to consumers and listeners. Holds no stream, so it
/// can be driven directly.
pub struct Dispatcher {
    table: Arc<CorrelationTable>,
    listeners: Arc<Listeners>,
    policy: MismatchPolicy,
}

impl Dispatcher {
    pub fn new(
        table: Arc<CorrelationTable>,
        listeners: Arc<Listeners>,
        policy: MismatchPolicy,
    ) -> Self {
        Self {
            table,
            listeners,
            policy,
        }
    }

    pub fn handle_line(&self, line: &str) -> LineOutcome {
        let Some(message) = InboundMessage::parse(line) else {
            tracing::warn!(line, "skipping malformed line from worker");
            return LineOutcome::Malformed;
        };

        let Some(wire_id) = message.id.clone() else {
            return self.handle_notification(message);
        };

        let entry = wire_id
            .parse::<RequestId>()
            .ok()
            .and_then(|id| self.table.take(id).map(|entry| (id, entry)));
        let Some((id, entry)) = entry else {
            tracing::debug!(id = %wire_id, "discarding reply with no pending request");
            return LineOutcome::Unmatched { id: wire_id };
        };

        let kind = entry.consumer.kind();
        let elapsed = entry.sent_at.elapsed();

        if let Some(error) = message.remote_error() {
            tracing::debug!(
                %id,
                method = %entry.method,
                code = %error.code,
                ?elapsed,
                "worker replied with an error"
            );
            let consumer = entry.consumer;
            let failed = contain_panic("consumer", || {
                consumer.fail(RequestError::remote(error.code, error.message))
            });
            return match failed {
                Some(()) => LineOutcome::Failed { id, kind },
                None => LineOutcome::Panicked { id, kind },
            };
        }

        let (consumer, policy, result) = (entry.consumer, self.policy, message.result);
        match contain_panic("consumer", || consumer.complete(result, policy)) {
            None => {
                tracing::warn!(%id, method = %entry.method, %kind, "consumer panicked on its reply");
                LineOutcome::Panicked { id, kind }
            }
            Some(Completion::Delivered) => {
                tracing::debug!(%id, method = %entry.method, %kind, ?elapsed, "reply delivered");
                LineOutcome::Completed { id, kind }
            }
            Some(Completion::Dropped(err)) => {
                tracing::warn!(
                    %id,
                    method = %entry.method,
                    %kind,
                    error = %err,
                    "dropping reply that does not match its consumer"
                );
                LineOutcome::Dropped { id, kind }
            }
        }
    }

    fn handle_notification(&self, message: InboundMessage) -> LineOutcome {
        match message.into_notification() {
            Some(notification) => {
                let delivered = self.listeners.notify(&notification);
                tracing::debug!(event = %notification.event, delivered, "worker notification");
                LineOutcome::Notification {
                    event: Some(notification.event),
                    delivered,
                }
            }
            None => {
                tracing::debug!("ignoring message with neither id nor event");
                LineOutcome::Notification {
                    event: None,
                    delivered: 0,
                }
            }
        }
    }

    /// Fail every request whose deadline has passed. Returns how many.
    pub fn expire(&self, now: Instant) -> usize {
        let expired = self.table.take_expired(now);
        let count = expired.len();
        for (id, entry) in expired {
            let after = entry.sent_at.elapsed();
            tracing::warn!(%id, method = %entry.method, ?after, "request timed out");
            let consumer = entry.consumer;
            let error = RequestError::Timeout {
                method: entry.method,
                after,
            };
            contain_panic("consumer", || consumer.fail(error));
        }
        count
    }

    /// Close the table and fail everything still pending with `error`.
    pub fn fail_all(&self, error: RequestError) -> usize {
        let drained = self.table.close();
        let count = drained.len();
        for (id, entry) in drained {
            tracing::debug!(%id, method = %entry.method, %error, "abandoning pending request");
            let consumer = entry.consumer;
            contain_panic("consumer", || consumer.fail(error.clone()));
        }
        count
    }
}

/// Background loop pairing a [`LineReader`] with a [`Dispatcher`].
pub struct ResponseReader {
    lines: LineReader,
    dispatcher: Dispatcher,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ResponseReader {
    pub fn new(
        lines: LineReader,
        dispatcher: Dispatcher,
        stop: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            lines,
            dispatcher,
            stop,
            poll_interval,
        }
    }

    pub fn spawn(self) -> TransportResult<JoinHandle<()>> {
        thread::Builder::new()
            .name("courier-reader".into())
            .spawn(move || self.run())
            .map_err(TransportError::ThreadSpawn)
    }

    /// Runs until the worker closes its output or `stop` is raised. Wakes at
    /// least once per poll interval to check `stop` and expire deadlines.
    pub fn run(mut self) {
        tracing::debug!(poll_interval = ?self.poll_interval, "response reader started");
        loop {
            if self.stop.load(Ordering::Acquire) {
                let abandoned = self.dispatcher.fail_all(RequestError::TransportClosed);
                tracing::debug!(abandoned, "response reader stopped");
                return;
            }

            match self.lines.next_batch(self.poll_interval) {
                LineBatch::Lines(lines) => {
                    for line in &lines {
                        self.dispatcher.handle_line(line);
                    }
                }
                LineBatch::Idle => {}
                LineBatch::Closed => {
                    let abandoned = self.dispatcher.fail_all(RequestError::WorkerExited);
                    tracing::info!(abandoned, "worker closed its output");
                    return;
                }
            }

            self.dispatcher.expire(Instant::now());
        }
    }
}
