//! Fetcher for files on the local disk.

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::debug;

use crate::context::FetchContext;
use crate::convert::DataConvertible;
use crate::error::{FetchError, FetcherKind};
use crate::fetcher::{CancelState, Delivery, FailureCallback, Fetcher, SuccessCallback};

/// Reads a file with `tokio::fs` on the background runtime and converts its contents.
///
/// Cancellation is advisory: a read that already started still completes,
/// but its callback is suppressed.
pub struct DiskFetcher<T> {
    path: PathBuf,
    key: String,
    context: FetchContext,
    state: Arc<CancelState>,
    _value: PhantomData<fn() -> T>,
}

impl<T: DataConvertible> DiskFetcher<T> {
    /// Create a fetcher for `path`. The path, as given, is the key.
    pub fn new(path: impl Into<PathBuf>, context: FetchContext) -> Self {
        let path = path.into();
        let key = path.to_string_lossy().into_owned();
        Self {
            path,
            key,
            context,
            state: Arc::new(CancelState::default()),
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> fmt::Debug for DiskFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskFetcher")
            .field("path", &self.path)
            .field("cancelled", &self.state.is_cancelled())
            .finish()
    }
}

impl<T: DataConvertible> Fetcher for DiskFetcher<T> {
    type Value = T;

    fn key(&self) -> &str {
        &self.key
    }

    fn fetch(&self, on_failure: FailureCallback, on_success: SuccessCallback<T>) {
        let Some(ticket) = self.state.begin() else {
            debug!(key = %self.key, "fetcher cancelled, not reading");
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
        let path = self.path.clone();

        debug!(key = %self.key, "reading from disk");
        self.context
            .runtime()
            .spawn(async move { read_and_convert(&path, delivery).await });
    }

    fn cancel_fetch(&self) {
        self.state.cancel();
    }
}

async fn read_and_convert<T: DataConvertible>(path: &Path, delivery: Delivery<T>) {
    // A cancel may have landed before this task was scheduled.
    if !delivery.is_live() {
        return;
    }

    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) => {
            debug!(key = %delivery.key(), error = %e, "disk read failed");
            delivery.finish(Err(FetchError::Io(e)));
            return;
        }
    };

    if !delivery.is_live() {
        return;
    }

    let outcome = T::convert_from_data(data)
        .ok_or_else(|| FetchError::invalid_data(FetcherKind::Disk, delivery.key()));
    delivery.finish(outcome);
}
