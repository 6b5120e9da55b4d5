//! The fetcher contract.
//!
//! A fetcher retrieves the bytes for one key, converts them and reports the
//! outcome through exactly one of two callbacks on the completion context.
//! Cancelling suppresses the callback; no callback runs once a cancel has
//! been observed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::debug;

use crate::context::CompletionQueue;
use crate::convert::DataConvertible;
use crate::error::{FetchError, FetchResult};

/// Callback receiving the error of a failed fetch.
pub type FailureCallback = Box<dyn FnOnce(FetchError) + Send + 'static>;

/// Callback receiving the converted value of a successful fetch.
pub type SuccessCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Asynchronous retrieval of a typed value for a single key.
///
/// Two fetchers with the same key are interchangeable as far as a cache is
/// concerned; uniqueness of keys is up to the owner.
pub trait Fetcher: Send + Sync {
    type Value: DataConvertible;

    /// Opaque identity of the fetched resource (a path or a URL).
    fn key(&self) -> &str;

    /// Start fetching without blocking the caller.
    ///
    /// Exactly one callback runs on the completion context unless the fetch
    /// is cancelled first. Calling `fetch` again while a previous call is in
    /// flight supersedes it: the earlier call never calls back.
    fn fetch(&self, on_failure: FailureCallback, on_success: SuccessCallback<Self::Value>);

    /// Suppress any pending callback. Idempotent and permanent for this instance.
    fn cancel_fetch(&self);
}

/// Convenience methods for every [`Fetcher`].
pub trait FetcherExt: Fetcher {
    /// Fetch and await the outcome.
    ///
    /// Resolves to `None` if the fetch was cancelled or superseded.
    fn fetch_async(
        &self,
    ) -> impl Future<Output = Option<FetchResult<Self::Value>>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let fail_tx = tx.clone();

        self.fetch(
            Box::new(move |err: FetchError| send_outcome(&fail_tx, Err(err))),
            Box::new(move |value: Self::Value| send_outcome(&tx, Ok(value))),
        );

        async move { rx.await.ok() }
    }
}

impl<F: Fetcher + ?Sized> FetcherExt for F {}

type OutcomeSender<T> = Arc<Mutex<Option<oneshot::Sender<FetchResult<T>>>>>;

fn send_outcome<T>(tx: &OutcomeSender<T>, outcome: FetchResult<T>) {
    let sender = tx.lock().ok().and_then(|mut guard| guard.take());
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
}

/// Identifies one `fetch` call on a fetcher instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

/// Cancellation state owned by a fetcher and shared with its background work.
#[derive(Debug, Default)]
pub(crate) struct CancelState {
    cancelled: AtomicBool,
    generation: AtomicU64,
}

impl CancelState {
    /// Begin a new operation, superseding the previous one.
    ///
    /// Returns `None` when the fetcher has been cancelled.
    pub(crate) fn begin(&self) -> Option<Ticket> {
        if self.is_cancelled() {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Some(Ticket(generation))
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether `ticket` is the current operation and nothing cancelled it.
    pub(crate) fn is_live(&self, ticket: Ticket) -> bool {
        !self.is_cancelled() && self.generation.load(Ordering::Acquire) == ticket.0
    }
}

/// Everything needed to report the outcome of one operation.
///
/// Background work holds this instead of a reference to the fetcher.
pub(crate) struct Delivery<T> {
    key: String,
    state: Arc<CancelState>,
    ticket: Ticket,
    completion: CompletionQueue,
    on_failure: FailureCallback,
    on_success: SuccessCallback<T>,
}

impl<T: Send + 'static> Delivery<T> {
    pub(crate) fn new(
        key: impl Into<String>,
        state: Arc<CancelState>,
        ticket: Ticket,
        completion: CompletionQueue,
        on_failure: FailureCallback,
        on_success: SuccessCallback<T>,
    ) -> Self {
        Self {
            key: key.into(),
            state,
            ticket,
            completion,
            on_failure,
            on_success,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state.is_live(self.ticket)
    }

    /// Hand the outcome to the completion context.
    ///
    /// Liveness is checked again on the completion context right before the
    /// callback runs.
    pub(crate) fn finish(self, outcome: FetchResult<T>) {
        let Self {
            key,
            state,
            ticket,
            completion,
            on_failure,
            on_success,
        } = self;

        completion.dispatch(move || {
            if !state.is_live(ticket) {
                debug!(key = %key, "fetch cancelled, dropping result");
                return;
            }
            match outcome {
                Ok(value) => on_success(value),
                Err(err) => on_failure(err),
            }
        });
    }
}
