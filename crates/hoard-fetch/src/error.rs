//! Error types for fetchers.

use std::fmt;

/// Domain for errors raised by the fetchers themselves.
pub const ERROR_DOMAIN: &str = "hoard.fetch";

/// Domain reported for pass-through filesystem errors.
pub const IO_ERROR_DOMAIN: &str = "std::io";

/// Domain reported for pass-through transport errors.
pub const TRANSPORT_ERROR_DOMAIN: &str = "hoard.transport";

/// Which fetcher raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetcherKind {
    Disk,
    Network,
}

impl FetcherKind {
    fn locator(self) -> &'static str {
        match self {
            Self::Disk => "path",
            Self::Network => "URL",
        }
    }
}

impl fmt::Display for FetcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disk => f.write_str("disk"),
            Self::Network => f.write_str("network"),
        }
    }
}

/// Error codes raised by the disk fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DiskErrorCode {
    InvalidData = -500,
}

/// Error codes raised by the network fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum NetworkErrorCode {
    InvalidData = -400,
    MissingData = -401,
    InvalidStatusCode = -402,
}

/// Errors raised by the HTTP transport underneath a network fetcher.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request was aborted before it completed.
    #[error("request was cancelled")]
    Cancelled,

    /// reqwest failed to send the request or read the body.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Connection-level failure reported by a non-reqwest transport.
    #[error("connection failed: {message}")]
    Connection { message: String },
}

impl TransportError {
    /// Whether this error is the artifact of aborting the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Integer code for the transport error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Cancelled => -999,
            Self::Request(e) if e.is_timeout() => -1001,
            Self::Request(e) if e.is_connect() => -1004,
            Self::Request(_) => -1,
            Self::Connection { .. } => -1004,
        }
    }
}

/// Fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Filesystem error, passed through unmodified.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Transport error, passed through unmodified.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The conversion capability rejected the bytes.
    #[error("failed to convert value from data at {} {key}", .kind.locator())]
    InvalidData { kind: FetcherKind, key: String },

    /// The response body is not as long as the server declared.
    #[error("request expected {expected} bytes and received {received} bytes")]
    MissingData { expected: u64, received: u64 },

    /// HTTP status outside the accepted range. `reason` is the status reason phrase.
    #[error("{reason}")]
    InvalidStatusCode { status: u16, reason: String },

    /// Error built from a raw code and description.
    #[error("{description}")]
    Coded { code: i32, description: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl FetchError {
    /// General constructor for an error in [`ERROR_DOMAIN`].
    pub fn with_code(code: i32, description: impl Into<String>) -> Self {
        Self::Coded {
            code,
            description: description.into(),
        }
    }

    pub(crate) fn invalid_data(kind: FetcherKind, key: impl Into<String>) -> Self {
        Self::InvalidData {
            kind,
            key: key.into(),
        }
    }

    /// Error domain.
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Io(_) => IO_ERROR_DOMAIN,
            Self::Transport(_) => TRANSPORT_ERROR_DOMAIN,
            _ => ERROR_DOMAIN,
        }
    }

    /// Error code, namespaced per fetcher kind for errors raised by fetchers.
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(e) => e.raw_os_error().unwrap_or(-1),
            Self::Transport(e) => e.code(),
            Self::InvalidData {
                kind: FetcherKind::Disk,
                ..
            } => DiskErrorCode::InvalidData as i32,
            Self::InvalidData {
                kind: FetcherKind::Network,
                ..
            } => NetworkErrorCode::InvalidData as i32,
            Self::MissingData { .. } => NetworkErrorCode::MissingData as i32,
            Self::InvalidStatusCode { .. } => NetworkErrorCode::InvalidStatusCode as i32,
            Self::Coded { code, .. } => *code,
            Self::Config { .. } => -1,
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Whether this error is a transport cancellation artifact.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_cancelled())
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;
