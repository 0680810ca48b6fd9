//! Typed callbacks awaiting a reply.

use std::fmt;

use courier_core::MismatchPolicy;
use serde_json::Value;

use crate::error::{DecodeError, RequestError, RequestResult};
use crate::processor::{ResultProcessor, SearchIdProcessor, VersionProcessor};

/// Boxed one-shot callback for a reply of type `T`.
pub type Callback<T> = Box<dyn FnOnce(RequestResult<T>) + Send + 'static>;

/// Explicit tag of a [`Consumer`], carried alongside the callback so the
/// reader can choose a decoder without inspecting the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerKind {
    Version,
    SearchId,
    Value,
}

impl ConsumerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerKind::Version => "version",
            ConsumerKind::SearchId => "search-id",
            ConsumerKind::Value => "value",
        }
    }
}

impl fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller waiting for one reply. Invoked at most once.
pub enum Consumer {
    Version(Callback<String>),
    SearchId(Callback<Option<String>>),
    /// Raw `result` for methods without a dedicated processor.
    Value(Callback<Value>),
}

/// How a consumer was finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Delivered,
    /// The result did not decode and the policy said to drop it.
    Dropped(DecodeError),
}

impl Consumer {
    pub fn version<F>(callback: F) -> Self
    where
        F: FnOnce(RequestResult<String>) + Send + 'static,
    {
        Self::Version(Box::new(callback))
    }

    pub fn search_id<F>(callback: F) -> Self
    where
        F: FnOnce(RequestResult<Option<String>>) + Send + 'static,
    {
        Self::SearchId(Box::new(callback))
    }

    pub fn value<F>(callback: F) -> Self
    where
        F: FnOnce(RequestResult<Value>) + Send + 'static,
    {
        Self::Value(Box::new(callback))
    }

    pub fn kind(&self) -> ConsumerKind {
        match self {
            Consumer::Version(_) => ConsumerKind::Version,
            Consumer::SearchId(_) => ConsumerKind::SearchId,
            Consumer::Value(_) => ConsumerKind::Value,
        }
    }

    /// Decode `result` for this consumer's kind and invoke it.
    pub fn complete(self, result: Option<Value>, policy: MismatchPolicy) -> Completion {
        match self {
            Consumer::Version(callback) => {
                deliver::<VersionProcessor>(callback, result.as_ref(), policy)
            }
            Consumer::SearchId(callback) => {
                deliver::<SearchIdProcessor>(callback, result.as_ref(), policy)
            }
            Consumer::Value(callback) => {
                callback(Ok(result.unwrap_or(Value::Null)));
                Completion::Delivered
            }
        }
    }

    /// Invoke the consumer with an error instead of a result.
    pub fn fail(self, error: RequestError) {
        match self {
            Consumer::Version(callback) => callback(Err(error)),
            Consumer::SearchId(callback) => callback(Err(error)),
            Consumer::Value(callback) => callback(Err(error)),
        }
    }
}

fn deliver<P: ResultProcessor>(
    callback: Callback<P::Output>,
    result: Option<&Value>,
    policy: MismatchPolicy,
) -> Completion {
    match P::decode(result) {
        Ok(decoded) => {
            callback(Ok(decoded));
            Completion::Delivered
        }
        Err(err) => match policy {
            MismatchPolicy::Report => {
                callback(Err(RequestError::Decode(err)));
                Completion::Delivered
            }
            MismatchPolicy::Drop => Completion::Dropped(err),
        },
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Consumer").field(&self.kind()).finish()
    }
}
