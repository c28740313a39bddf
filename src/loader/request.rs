//! In-flight request state and the caller's handle to it

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::completion::CompletionObservable;
use crate::error::LoadError;

use super::Resource;

/// How a request ended, as reported to completion subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The resource was resolved
    Loaded,
    /// The load failed for good
    Failed,
    /// The request was aborted before it ended
    Aborted,
}

/// State shared between a load task and its [`FileRequest`] handle
#[derive(Debug)]
pub struct ResourceRequest {
    url: String,
    binary: bool,
    attempt_index: AtomicU32,
    aborted: watch::Sender<bool>,
    completion: CompletionObservable<RequestOutcome>,
}

impl ResourceRequest {
    pub(crate) fn new(url: String, binary: bool) -> Self {
        Self {
            url,
            binary,
            attempt_index: AtomicU32::new(0),
            aborted: watch::Sender::new(false),
            completion: CompletionObservable::new(),
        }
    }

    /// Resolved url, without the base prefix
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the payload is loaded as raw bytes
    pub fn binary(&self) -> bool {
        self.binary
    }

    /// Index of the current transport attempt
    pub fn attempt_index(&self) -> u32 {
        self.attempt_index.load(Ordering::SeqCst)
    }

    pub(crate) fn next_attempt(&self) -> u32 {
        self.attempt_index.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether [`abort`](Self::abort) was called
    pub fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }

    /// Flip the abort flag; returns false if it was already set
    pub fn abort(&self) -> bool {
        self.aborted.send_if_modified(|aborted| {
            if *aborted {
                false
            } else {
                *aborted = true;
                true
            }
        })
    }

    /// Resolves once the request is aborted
    pub(crate) async fn aborted(&self) {
        let mut rx = self.aborted.subscribe();
        let closed = rx.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            // Sender lives as long as self, so this never resolves
            std::future::pending::<()>().await;
        }
    }

    /// Completion fired once when the request ends
    pub fn completion(&self) -> &CompletionObservable<RequestOutcome> {
        &self.completion
    }
}

/// Handle to a spawned load
///
/// Dropping the handle does not cancel the load; callbacks still run.
#[derive(Debug)]
pub struct FileRequest {
    shared: Arc<ResourceRequest>,
    task: JoinHandle<Result<Option<Resource>, LoadError>>,
}

impl FileRequest {
    pub(crate) fn new(
        shared: Arc<ResourceRequest>,
        task: JoinHandle<Result<Option<Resource>, LoadError>>,
    ) -> Self {
        Self { shared, task }
    }

    /// Cancel the load
    ///
    /// Idempotent. Drops whatever the load is waiting on. No success or
    /// error is delivered afterwards; completion still fires once.
    pub fn abort(&self) {
        self.shared.abort();
    }

    /// Completion fired once when the request ends
    pub fn completion(&self) -> &CompletionObservable<RequestOutcome> {
        self.shared.completion()
    }

    /// Index of the current transport attempt
    pub fn attempt_index(&self) -> u32 {
        self.shared.attempt_index()
    }

    /// Whether the request was aborted
    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    /// Resolved url, without the base prefix
    pub fn url(&self) -> &str {
        self.shared.url()
    }

    /// Shared request state, usable after the handle is consumed by `wait`
    pub fn state(&self) -> Arc<ResourceRequest> {
        self.shared.clone()
    }

    /// Whether the load task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the load to end
    ///
    /// - `Ok(Some(resource))`: loaded and no success callback was supplied
    /// - `Err(err)`: failed and no error callback was supplied
    /// - `Ok(None)`: aborted, or the outcome went to a callback
    pub async fn wait(self) -> Result<Option<Resource>, LoadError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Ok(None),
        }
    }
}
