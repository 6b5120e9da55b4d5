//! Execution contexts shared by fetchers.
//!
//! Two contexts are involved in every fetch:
//!
//! - the background runtime, where disk reads and HTTP requests run
//! - the completion queue, where every user-visible callback runs
//!
//! The completion queue is drained by exactly one consumer, so callbacks
//! never run concurrently with each other and never run on a runtime worker.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};

/// Name of the thread started by [`CompletionQueue::spawn`].
pub const COMPLETION_THREAD_NAME: &str = "hoard-completion";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for scheduling actions on the completion context.
///
/// Actions scheduled through clones of the same queue run in FIFO order.
#[derive(Debug, Clone)]
pub struct CompletionQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl CompletionQueue {
    /// Start a dedicated completion thread and return its queue.
    ///
    /// The thread exits once every clone of the queue has been dropped.
    pub fn spawn() -> FetchResult<Self> {
        let (queue, receiver) = Self::channel();
        thread::Builder::new()
            .name(COMPLETION_THREAD_NAME.to_string())
            .spawn(move || receiver.run_blocking())?;
        Ok(queue)
    }

    /// Create a queue whose actions are run by the returned receiver.
    ///
    /// Use this when the host already has a main loop that should act as the
    /// completion context.
    pub fn channel() -> (Self, CompletionReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, CompletionReceiver { rx })
    }

    /// Schedule `action` to run on the completion context.
    pub fn dispatch<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(action)).is_err() {
            debug!("completion context is gone, dropping action");
        }
    }

    /// Whether the consuming side is still alive.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Consuming side of a [`CompletionQueue`].
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl CompletionReceiver {
    /// Run every action that is already queued. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            run_job(job);
            ran += 1;
        }
        ran
    }

    /// Wait for the next action and run it.
    ///
    /// Returns `false` once every queue handle has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                run_job(job);
                true
            }
            None => false,
        }
    }

    /// Run actions on the current thread until every queue handle is dropped.
    ///
    /// Must not be called from inside an async runtime.
    pub fn run_blocking(mut self) {
        while let Some(job) = self.rx.blocking_recv() {
            run_job(job);
        }
        debug!("completion queue closed");
    }
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!("completion callback panicked");
    }
}

/// Process-wide resources a fetcher runs on, injected at construction.
#[derive(Debug, Clone)]
pub struct FetchContext {
    runtime: Handle,
    completion: CompletionQueue,
}

impl FetchContext {
    pub fn new(runtime: Handle, completion: CompletionQueue) -> Self {
        Self {
            runtime,
            completion,
        }
    }

    /// Use the ambient tokio runtime and start a dedicated completion thread.
    ///
    /// Every call starts a new thread. Build the context once and clone it
    /// into each fetcher so that all callbacks share one completion context.
    pub fn current() -> FetchResult<Self> {
        Self::with_completion(CompletionQueue::spawn()?)
    }

    /// Use the ambient tokio runtime with an existing completion queue.
    pub fn with_completion(completion: CompletionQueue) -> FetchResult<Self> {
        let runtime = Handle::try_current().map_err(|e| FetchError::Config {
            message: format!("no tokio runtime available: {}", e),
        })?;
        Ok(Self::new(runtime, completion))
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn completion(&self) -> &CompletionQueue {
        &self.completion
    }
}
