//! Outstanding requests, keyed by id.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::consumer::Consumer;
use crate::error::{TransportError, TransportResult};
use crate::id::RequestId;
use crate::lock;

/// A request that has been sent and is waiting for its reply.
#[derive(Debug)]
pub struct PendingEntry {
    pub method: String,
    pub consumer: Consumer,
    pub deadline: Option<Instant>,
    pub sent_at: Instant,
}

impl PendingEntry {
    pub fn new(method: impl Into<String>, consumer: Consumer) -> Self {
        Self {
            method: method.into(),
            consumer,
            deadline: None,
            sent_at: Instant::now(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

#[derive(Debug, Default)]
struct Entries {
    pending: HashMap<RequestId, PendingEntry>,
    closed: bool,
}

/// Every operation runs under one lock, so an id is registered, taken, or
/// expired exactly once.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: Mutex<Entries>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: RequestId, entry: PendingEntry) -> TransportResult<()> {
        let mut entries = lock(&self.entries);
        if entries.closed {
            return Err(TransportError::Closed);
        }
        if entries.pending.contains_key(&id) {
            return Err(TransportError::DuplicateRequestId(id));
        }
        entries.pending.insert(id, entry);
        Ok(())
    }

    /// Remove and return the entry for `id`, if it is still pending.
    pub fn take(&self, id: RequestId) -> Option<PendingEntry> {
        lock(&self.entries).pending.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).pending.is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).pending.len()
    }

    /// Remove every entry whose deadline has passed at `now`.
    pub fn take_expired(&self, now: Instant) -> Vec<(RequestId, PendingEntry)> {
        let mut entries = lock(&self.entries);
        let expired: Vec<RequestId> = entries
            .pending
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| entries.pending.remove_entry(&id))
            .collect()
    }

    /// Remove everything and refuse further registrations.
    pub fn close(&self) -> Vec<(RequestId, PendingEntry)> {
        let mut entries = lock(&self.entries);
        entries.closed = true;
        let mut drained: Vec<_> = entries.pending.drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.entries).closed
    }
}
