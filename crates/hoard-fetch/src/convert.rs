//! Conversion from raw bytes to typed values.
//!
//! Fetchers make no assumptions about the byte format. A fetched value type
//! implements [`DataConvertible`], and returning `None` marks the bytes as
//! unconvertible, which the fetcher reports as an invalid-data error.

use serde::de::DeserializeOwned;

/// Capability to build a value from raw bytes.
pub trait DataConvertible: Sized + Send + 'static {
    /// Convert `data` into a value, or `None` if the bytes are unusable.
    fn convert_from_data(data: Vec<u8>) -> Option<Self>;
}

impl DataConvertible for Vec<u8> {
    fn convert_from_data(data: Vec<u8>) -> Option<Self> {
        Some(data)
    }
}

impl DataConvertible for String {
    fn convert_from_data(data: Vec<u8>) -> Option<Self> {
        String::from_utf8(data).ok()
    }
}

/// JSON document decoded with serde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> DataConvertible for Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn convert_from_data(data: Vec<u8>) -> Option<Self> {
        serde_json::from_slice(&data).ok().map(Json)
    }
}
