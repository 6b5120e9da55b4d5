//! Cancellable fetchers for the hoard cache layer.
//!
//! A fetcher turns a key (a file path or a URL) into a typed value, off the
//! caller's thread, and reports the outcome on a single completion context:
//!
//! - [`DiskFetcher`] reads a file with `tokio::fs` on the background runtime
//! - [`NetworkFetcher`] issues an HTTP GET through an [`HttpTransport`]
//! - [`for_each_ordered_entry`] walks a directory sorted by a file attribute,
//!   for eviction scans
//!
//! Values are built from raw bytes through [`DataConvertible`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hoard_fetch::{
//!     FetchContext, FetchError, Fetcher, NetworkConfig, NetworkFetcher, ReqwestTransport,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! // One context per process: clone it into every fetcher.
//! let context = FetchContext::current()?;
//! let transport = Arc::new(ReqwestTransport::new(&NetworkConfig::from_env())?);
//!
//! let fetcher = NetworkFetcher::<String>::parse(
//!     "https://example.com/banner.txt",
//!     transport,
//!     context.clone(),
//! )?;
//! fetcher.fetch(
//!     Box::new(|err: FetchError| eprintln!("fetch failed: {} ({})", err, err.code())),
//!     Box::new(|text: String| println!("fetched {} bytes", text.len())),
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `HOARD_HTTP_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `HOARD_HTTP_USER_AGENT` | `User-Agent` header (default: `hoard-fetch/<version>`) |

pub mod config;
pub mod context;
pub mod convert;
pub mod disk;
pub mod error;
pub mod fetcher;
pub mod listing;
pub mod network;

// Re-export main types
pub use config::{NetworkConfig, DEFAULT_USER_AGENT};
pub use context::{CompletionQueue, CompletionReceiver, FetchContext, COMPLETION_THREAD_NAME};
pub use convert::{DataConvertible, Json};
pub use disk::DiskFetcher;
pub use error::{
    DiskErrorCode, FetchError, FetchResult, FetcherKind, NetworkErrorCode, TransportError,
    ERROR_DOMAIN, IO_ERROR_DOMAIN, TRANSPORT_ERROR_DOMAIN,
};
pub use fetcher::{FailureCallback, Fetcher, FetcherExt, SuccessCallback};
pub use listing::{
    for_each_ordered_entry, is_ordered_before, ordered_entries, AttributeValue, SortAttribute,
    SortOrder,
};
pub use network::{HttpResponse, HttpTransport, NetworkFetcher, ReqwestTransport};
