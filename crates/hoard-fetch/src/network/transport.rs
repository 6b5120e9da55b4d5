//! HTTP transport seam.
//!
//! The network fetcher only needs "GET this URL and give me status, declared
//! length and body". Putting that behind a trait keeps the shared client an
//! explicit dependency and lets tests substitute fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;
use url::Url;

use crate::config::NetworkConfig;
use crate::error::{FetchError, FetchResult, TransportError};

/// A completed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,

    /// Body length declared by the server, if any.
    pub expected_length: Option<u64>,

    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status,
            expected_length: Some(body.len() as u64),
            body,
        }
    }

    /// Override the declared length.
    pub fn with_expected_length(mut self, expected_length: Option<u64>) -> Self {
        self.expected_length = expected_length;
        self
    }
}

/// Something that can perform an HTTP GET.
///
/// Implementations are shared across fetchers and must be cheap to call
/// concurrently. Dropping the returned future must abort the request.
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &NetworkConfig) -> FetchResult<Self> {
        let user_agent =
            HeaderValue::from_str(&config.user_agent).map_err(|e| FetchError::Config {
                message: format!("invalid user agent: {}", e),
            })?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, user_agent);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| FetchError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    pub fn from_env() -> FetchResult<Self> {
        Self::new(&NetworkConfig::from_env())
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        let mut response = self.client.get(url.clone()).send().await?;

        let status = response.status().as_u16();
        let expected_length = response.content_length();
        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                // The server declared a length and the body ended early:
                // length validation reports it as missing data.
                Err(e) if expected_length.is_some() && is_truncated_body(&e) => {
                    debug!(url = %url, received = body.len(), error = %e, "response body cut short");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(HttpResponse {
            status,
            expected_length,
            body,
        })
    }
}

fn is_truncated_body(err: &reqwest::Error) -> bool {
    (err.is_body() || err.is_decode()) && !err.is_timeout()
}
