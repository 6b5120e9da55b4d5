//! Response validation: status, length, conversion. No I/O here.

use reqwest::StatusCode;

use crate::convert::DataConvertible;
use crate::error::{FetchError, FetchResult, FetcherKind};

use super::transport::HttpResponse;

/// Whether a status code is accepted as a successful fetch.
pub(crate) fn is_valid_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Standard reason phrase for a status code.
pub(crate) fn status_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(String::from)
        .unwrap_or_else(|| format!("Unknown status code {}", status))
}

/// Check a response in order: status, declared length, conversion.
pub(crate) fn validate_response<T: DataConvertible>(
    url: &str,
    response: HttpResponse,
) -> FetchResult<T> {
    if !is_valid_status(response.status) {
        return Err(FetchError::InvalidStatusCode {
            status: response.status,
            reason: status_reason(response.status),
        });
    }

    let received = response.body.len() as u64;
    if let Some(expected) = response.expected_length {
        if expected != received {
            return Err(FetchError::MissingData { expected, received });
        }
    }

    T::convert_from_data(response.body)
        .ok_or_else(|| FetchError::invalid_data(FetcherKind::Network, url))
}
