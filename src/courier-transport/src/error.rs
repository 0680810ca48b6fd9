//! Error types for the transport and for individual requests.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::id::RequestId;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result handed to a consumer when its request completes.
pub type RequestResult<T> = Result<T, RequestError>;

/// Failures of the transport itself. These are returned to whoever called
/// into the transport and are fatal to that call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid worker configuration: {0}")]
    Config(#[from] courier_core::ValidationError),
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] io::Error),
    #[error("worker process has no stdin")]
    NoStdin,
    #[error("worker process has no stdout")]
    NoStdout,
    #[error("failed to start transport thread: {0}")]
    ThreadSpawn(#[source] io::Error),
    #[error("failed to write to worker: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),
    #[error("worker handshake rejected ({reason}): {line}")]
    Handshake { line: String, reason: String },
    #[error("worker sent no handshake within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("worker process exited")]
    WorkerExited,
    #[error("request id {0} is already pending")]
    DuplicateRequestId(RequestId),
    #[error("transport is closed")]
    Closed,
}

/// Failures delivered to a consumer in place of a decoded result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("worker error: {message} (code: {code})")]
    Remote { code: String, message: String },
    #[error("failed to decode result: {0}")]
    Decode(#[from] DecodeError),
    #[error("{method} timed out after {after:?}")]
    Timeout { method: String, after: Duration },
    #[error("worker process exited before replying")]
    WorkerExited,
    #[error("transport closed before the worker replied")]
    TransportClosed,
}

impl RequestError {
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The request can never be answered because the worker side is gone.
    pub fn is_worker_exited(&self) -> bool {
        matches!(self, Self::WorkerExited | Self::TransportClosed)
    }
}

/// A result payload did not have the shape its processor expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("response has no result")]
    MissingResult,
    #[error("result is not an object")]
    NotAnObject,
    #[error("result field `{0}` is missing")]
    MissingField(&'static str),
    #[error("result field `{field}` should be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Errors from the blocking helpers on [`crate::AnalysisClient`].
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("no reply within {0:?}")]
    NoReply(Duration),
    #[error("reply was discarded before reaching the caller")]
    Discarded,
}
