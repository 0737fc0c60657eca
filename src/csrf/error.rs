//! Errors raised while acquiring a token.

use std::sync::Arc;

use thiserror::Error;

/// The token-issuing endpoint could not be reached or refused to issue.
///
/// `Clone` because every caller coalesced onto one acquisition receives the
/// same outcome.
#[derive(Debug, Clone, Error)]
pub enum TokenAcquisitionError {
    /// Network-level failure talking to the token endpoint.
    #[error("network error requesting CSRF cookie from {url}: {source}")]
    Network {
        /// Token endpoint URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: Arc<reqwest::Error>,
    },

    /// The token endpoint did not answer in time.
    #[error("timeout requesting CSRF cookie from {url}")]
    Timeout {
        /// Token endpoint URL.
        url: String,
    },

    /// The token endpoint answered with a non-success status.
    #[error("HTTP {status} requesting CSRF cookie from {url}")]
    HttpStatus {
        /// Token endpoint URL.
        url: String,
        /// Status code returned.
        status: u16,
    },

    /// The acquisition task ended without producing an outcome.
    #[error("CSRF cookie acquisition from {url} was interrupted")]
    Interrupted {
        /// Token endpoint URL.
        url: String,
    },
}

impl TokenAcquisitionError {
    /// Creates a network error, promoting timeouts to [`Self::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source: Arc::new(source),
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an error for an acquisition task that panicked or was aborted.
    pub fn interrupted(url: impl Into<String>) -> Self {
        Self::Interrupted { url: url.into() }
    }

    /// Status code returned by the endpoint, if it answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Network { .. } | Self::Timeout { .. } | Self::Interrupted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error =
            TokenAcquisitionError::http_status("http://localhost/sanctum/csrf-cookie", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected status in: {msg}");
        assert!(msg.contains("sanctum/csrf-cookie"), "Expected URL in: {msg}");
        assert_eq!(error.status(), Some(503));
    }

    #[test]
    fn test_timeout_has_no_status() {
        let error = TokenAcquisitionError::Timeout {
            url: "http://localhost/sanctum/csrf-cookie".to_string(),
        };
        assert_eq!(error.status(), None);
        assert!(error.to_string().contains("timeout"));
    }
}
