//! Listeners for worker notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::contain_panic;
use crate::protocol::ServerNotification;

/// Receives notifications (messages without an `id`) on the reader thread.
pub trait NotificationListener: Send + Sync {
    fn on_notification(&self, notification: &ServerNotification);
}

impl<F> NotificationListener for F
where
    F: Fn(&ServerNotification) + Send + Sync,
{
    fn on_notification(&self, notification: &ServerNotification) {
        self(notification)
    }
}

/// Handle returned by [`Listeners::add`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Arc<dyn NotificationListener>)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Deliver `notification` to every listener and return how many handled
    /// it without panicking.
    ///
    /// Listeners run outside the lock so they may add or remove listeners.
    pub fn notify(&self, notification: &ServerNotification) -> usize {
        let snapshot: Vec<Arc<dyn NotificationListener>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        snapshot
            .iter()
            .filter_map(|listener| {
                contain_panic("notification listener", || listener.on_notification(notification))
            })
            .count()
    }
}
