//! Typed facade over [`Transport`], one method per worker operation.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use courier_core::WorkerConfig;

use crate::consumer::{Callback, Consumer};
use crate::error::{CallError, RequestResult, TransportResult};
use crate::id::RequestId;
use crate::listener::{ListenerId, NotificationListener};
use crate::requests::{self, AnalysisOptions};
use crate::transport::Transport;

/// Analysis worker client.
///
/// Every operation returns as soon as the request is written; the callback
/// runs later on the reader thread. [`AnalysisClient::call`] wraps any of
/// them into a blocking call with a timeout.
pub struct AnalysisClient {
    transport: Transport,
}

impl AnalysisClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Launch the worker described by `config` and connect to it.
    pub fn start(config: &WorkerConfig) -> TransportResult<Self> {
        Transport::start(config).map(Self::new)
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn get_version<F>(&self, on_version: F) -> TransportResult<RequestId>
    where
        F: FnOnce(RequestResult<String>) + Send + 'static,
    {
        self.transport
            .dispatch(requests::server_get_version, Some(Consumer::version(on_version)))
    }

    pub fn find_element_references<F>(
        &self,
        file: &str,
        offset: u64,
        include_potential: bool,
        on_search_id: F,
    ) -> TransportResult<RequestId>
    where
        F: FnOnce(RequestResult<Option<String>>) + Send + 'static,
    {
        self.transport.dispatch(
            |id| requests::search_find_element_references(id, file, offset, include_potential),
            Some(Consumer::search_id(on_search_id)),
        )
    }

    pub fn find_member_declarations<F>(&self, name: &str, on_search_id: F) -> TransportResult<RequestId>
    where
        F: FnOnce(RequestResult<Option<String>>) + Send + 'static,
    {
        self.transport.dispatch(
            |id| requests::search_find_member_declarations(id, name),
            Some(Consumer::search_id(on_search_id)),
        )
    }

    pub fn find_member_references<F>(&self, name: &str, on_search_id: F) -> TransportResult<RequestId>
    where
        F: FnOnce(RequestResult<Option<String>>) + Send + 'static,
    {
        self.transport.dispatch(
            |id| requests::search_find_member_references(id, name),
            Some(Consumer::search_id(on_search_id)),
        )
    }

    pub fn find_top_level_declarations<F>(
        &self,
        pattern: &str,
        on_search_id: F,
    ) -> TransportResult<RequestId>
    where
        F: FnOnce(RequestResult<Option<String>>) + Send + 'static,
    {
        self.transport.dispatch(
            |id| requests::search_find_top_level_declarations(id, pattern),
            Some(Consumer::search_id(on_search_id)),
        )
    }

    /// Fire-and-forget.
    pub fn set_options(&self, context_id: &str, options: &AnalysisOptions) -> TransportResult<RequestId> {
        self.transport.dispatch(
            |id| requests::context_set_options(id, context_id, options),
            None,
        )
    }

    /// Fire-and-forget.
    pub fn set_priority_sources(
        &self,
        context_id: &str,
        sources: &[String],
    ) -> TransportResult<RequestId> {
        self.transport.dispatch(
            |id| requests::context_set_priority_sources(id, context_id, sources),
            None,
        )
    }

    pub fn shutdown(&self) -> TransportResult<RequestId> {
        self.transport.shutdown()
    }

    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        self.transport.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.transport.remove_listener(id)
    }

    /// Issue a request through `issue` and block until its callback fires
    /// or `timeout` passes.
    ///
    /// On `NoReply` the request stays pending; it is failed later by the
    /// transport's own request deadline, if one is configured.
    ///
    /// ```ignore
    /// let version = client.call(Duration::from_secs(5), |c, done| c.get_version(done))?;
    /// ```
    pub fn call<T, I>(&self, timeout: Duration, issue: I) -> Result<T, CallError>
    where
        T: Send + 'static,
        I: FnOnce(&Self, Callback<T>) -> TransportResult<RequestId>,
    {
        let (tx, rx) = mpsc::channel();
        let done: Callback<T> = Box::new(move |result: RequestResult<T>| {
            // the caller may have stopped waiting
            let _ = tx.send(result);
        });
        issue(self, done)?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(CallError::from),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CallError::NoReply(timeout)),
            // callback dropped uncalled: the mismatch policy discarded the reply
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CallError::Discarded),
        }
    }

    /// Blocking `server.getVersion`.
    pub fn version(&self, timeout: Duration) -> Result<String, CallError> {
        self.call(timeout, |client, done| client.get_version(done))
    }
}
