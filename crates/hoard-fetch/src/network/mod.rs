//! Fetcher for resources behind an HTTP URL.
//!
//! Cancellation is active here: besides suppressing the callback, the
//! in-flight request is aborted. The abort is not synchronous, so whatever
//! the transport reports afterwards is still observed and discarded.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::context::FetchContext;
use crate::convert::DataConvertible;
use crate::error::{FetchError, FetchResult, TransportError};
use crate::fetcher::{CancelState, Delivery, FailureCallback, Fetcher, SuccessCallback, Ticket};

mod transport;
mod validate;

pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

/// Issues a GET for a URL, validates the response and converts the body.
pub struct NetworkFetcher<T> {
    url: Url,
    key: String,
    transport: Arc<dyn HttpTransport>,
    context: FetchContext,
    state: Arc<CancelState>,
    in_flight: Mutex<Option<CancellationToken>>,
    _value: PhantomData<fn() -> T>,
}

impl<T: DataConvertible> NetworkFetcher<T> {
    /// Create a fetcher for `url`. The absolute URL string is the key.
    pub fn new(url: Url, transport: Arc<dyn HttpTransport>, context: FetchContext) -> Self {
        let key = url.as_str().to_string();
        Self {
            url,
            key,
            transport,
            context,
            state: Arc::new(CancelState::default()),
            in_flight: Mutex::new(None),
            _value: PhantomData,
        }
    }

    /// Parse `url` and create a fetcher for it.
    pub fn parse(
        url: &str,
        transport: Arc<dyn HttpTransport>,
        context: FetchContext,
    ) -> FetchResult<Self> {
        let url = Url::parse(url).map_err(|e| FetchError::Config {
            message: format!("invalid URL {}: {}", url, e),
        })?;
        Ok(Self::new(url, transport, context))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a ticket and install a fresh abort token, cancelling the previous one.
    ///
    /// Runs under the in-flight lock, as does `cancel_fetch`, so a cancel
    /// either refuses this request or sees its token.
    fn start_request(&self) -> Option<(Ticket, CancellationToken)> {
        let mut in_flight = self.lock_in_flight();
        let ticket = self.state.begin()?;
        let token = CancellationToken::new();
        if let Some(previous) = in_flight.replace(token.clone()) {
            previous.cancel();
        }
        Some((ticket, token))
    }
}

impl<T> fmt::Debug for NetworkFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkFetcher")
            .field("url", &self.url.as_str())
            .field("transport", &self.transport)
            .field("cancelled", &self.state.is_cancelled())
            .finish()
    }
}

impl<T: DataConvertible> Fetcher for NetworkFetcher<T> {
    type Value = T;

    fn key(&self) -> &str {
        &self.key
    }

    fn fetch(&self, on_failure: FailureCallback, on_success: SuccessCallback<T>) {
        let Some((ticket, token)) = self.start_request() else {
            debug!(url = %self.url, "fetcher cancelled, not requesting");
            return;
        };

        let delivery = Delivery::new(
            self.key.clone(),
            self.state.clone(),
            ticket,
            self.context.completion().clone(),
            on_failure,
            on_success,
        );
        let transport = self.transport.clone();
        let url = self.url.clone();

        debug!(url = %url, "requesting");
        self.context.runtime().spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(TransportError::Cancelled),
                result = transport.get(&url) => result,
            };
            on_response(result, delivery);
        });
    }

    fn cancel_fetch(&self) {
        let mut in_flight = self.lock_in_flight();
        self.state.cancel();
        if let Some(token) = in_flight.take() {
            token.cancel();
        }
    }
}

fn on_response<T: DataConvertible>(
    result: Result<HttpResponse, TransportError>,
    delivery: Delivery<T>,
) {
    if !delivery.is_live() {
        debug!(url = %delivery.key(), "ignoring response for cancelled fetch");
        return;
    }

    let response = match result {
        Ok(response) => response,
        Err(e) if e.is_cancelled() => return,
        Err(e) => {
            debug!(url = %delivery.key(), error = %e, "request failed");
            delivery.finish(Err(FetchError::Transport(e)));
            return;
        }
    };

    let outcome = validate::validate_response(delivery.key(), response);
    if let Err(e) = &outcome {
        debug!(url = %delivery.key(), code = e.code(), error = %e, "invalid response");
    }
    delivery.finish(outcome);
}
