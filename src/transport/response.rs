//! Successful API responses.

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::error::ApiError;

/// A 2xx response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    url: String,
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    message: Option<String>,
}

impl ApiResponse {
    pub(crate) fn new(url: String, status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            url,
            status,
            headers,
            body,
        }
    }

    /// Final request URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text (lossy).
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the whole body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|source| ApiError::Decode {
            url: self.url.clone(),
            source,
        })
    }

    /// Decodes the `data` member of a `{"data": ...}` envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] when the body has no `data` member or it
    /// does not decode as `T`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        self.json::<DataEnvelope<T>>().map(|envelope| envelope.data)
    }

    /// The server's `message` member, when the body is a JSON object with one.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        serde_json::from_slice::<MessageEnvelope>(&self.body)
            .ok()
            .and_then(|envelope| envelope.message)
    }
}
