//! Client transport for an external analysis worker.
//!
//! This crate provides:
//! - A line channel over the worker's stdin/stdout
//! - A correlation table that pairs each reply with the caller waiting for it
//! - A background reader that decodes replies into typed results
//! - [`AnalysisClient`], a typed facade with one method per worker operation
//!
//! # Protocol
//!
//! One JSON object per line in each direction:
//! - Requests: `{"id": "<n>", "method": "<name>", "params": {...}}`
//! - Replies: `{"id": "<n>", "result": {...}}` or `{"id": "<n>", "error": {...}}`
//! - Notifications: `{"event": "<name>", "params": {...}}` (no `id`)
//!
//! Ids are the decimal form of a per-transport counter starting at 0. The
//! worker announces itself with a `server.connected` notification before
//! anything else.
//!
//! # Usage
//!
//! ```rust,ignore
//! use courier_core::WorkerConfig;
//! use courier_transport::AnalysisClient;
//! use std::time::Duration;
//!
//! let config = WorkerConfig {
//!     runtime_path: Some("dart".into()),
//!     script_path: Some("analysis_server.dart".into()),
//!     ..WorkerConfig::default()
//! };
//!
//! let client = AnalysisClient::start(&config)?;
//! client.get_version(|version| println!("{version:?}"))?;
//! let version = client.version(Duration::from_secs(5))?;
//! client.shutdown()?;
//! ```

pub mod channel;
mod client;
pub mod consumer;
mod error;
pub mod id;
pub mod listener;
pub mod processor;
pub mod protocol;
pub mod reader;
pub mod requests;
pub mod table;
mod transport;

pub use client::AnalysisClient;
pub use consumer::{Callback, Consumer, ConsumerKind};
pub use error::{CallError, DecodeError, RequestError, RequestResult, TransportError, TransportResult};
pub use id::{IdGenerator, RequestId};
pub use listener::{ListenerId, NotificationListener};
pub use protocol::{InboundMessage, RemoteError, RequestEnvelope, ServerNotification};
pub use requests::AnalysisOptions;
pub use transport::{Transport, TransportOptions};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run a user callback on a transport thread. A panic is logged and
/// reported as `None` instead of unwinding through the thread.
pub(crate) fn contain_panic<T>(callback: &str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(callback, panic = panic_message(&*payload), "callback panicked");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
