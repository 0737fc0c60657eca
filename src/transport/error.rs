//! Error types for API requests.
//!
//! Every failed request surfaces exactly one [`ApiError`]. The
//! [`FailureKind`] taxonomy groups variants by how the caller should react;
//! [`ApiError::is_expected`] marks the kinds that are normal control flow
//! (validation feedback, an expired session) rather than faults.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::csrf::TokenAcquisitionError;

/// Coarse classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The server rejected the submitted data (HTTP 422).
    Validation,
    /// The identity check reported no session (HTTP 401 on the identity endpoint).
    SessionExpired,
    /// The server rejected the anti-forgery token (HTTP 419) and recovery failed.
    TokenMismatch,
    /// A fresh token could not be obtained.
    TokenAcquisition,
    /// No usable HTTP response (network failure, timeout, bad URL).
    Transport,
    /// Any other non-success response, or an undecodable body.
    Domain,
}

impl FailureKind {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::SessionExpired => "session_expired",
            Self::TokenMismatch => "token_mismatch",
            Self::TokenAcquisition => "token_acquisition",
            Self::Transport => "transport",
            Self::Domain => "domain",
        }
    }
}

/// Errors returned by [`crate::ApiClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// Field-level validation feedback from the server.
    #[error("validation failed for {url}: {message}")]
    Validation {
        /// Request URL.
        url: String,
        /// Summary message from the server.
        message: String,
        /// Per-field messages.
        errors: BTreeMap<String, Vec<String>>,
    },

    /// The identity check found no authenticated session.
    #[error("session expired or not authenticated ({url})")]
    SessionExpired {
        /// Request URL.
        url: String,
    },

    /// The anti-forgery token was rejected and could not be recovered.
    #[error("CSRF token mismatch for {url} (retried: {retried})")]
    TokenMismatch {
        /// Request URL.
        url: String,
        /// Whether the request had already been resubmitted once.
        retried: bool,
    },

    /// A fresh token could not be obtained before sending.
    #[error(transparent)]
    TokenAcquisition(#[from] TokenAcquisitionError),

    /// Network-level failure.
    #[error("network error requesting {url}: {source}")]
    Transport {
        /// Request URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out.
    #[error("timeout requesting {url}")]
    Timeout {
        /// Request URL.
        url: String,
    },

    /// Non-success response not covered by a more specific variant.
    #[error("HTTP {status} from {url}{}", message_suffix(.message))]
    Domain {
        /// Request URL.
        url: String,
        /// Status code returned.
        status: u16,
        /// Server-supplied `message`, when the body carried one.
        message: Option<String>,
    },

    /// A success response body could not be decoded.
    #[error("could not decode response from {url}: {source}")]
    Decode {
        /// Request URL.
        url: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The request body could not be encoded.
    #[error("could not encode request body for {url}: {source}")]
    Encode {
        /// Request URL.
        url: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The target did not resolve to a valid URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl ApiError {
    /// Creates a transport error, promoting timeouts to [`Self::Timeout`].
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Transport {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates a token-mismatch error.
    pub fn token_mismatch(url: impl Into<String>, retried: bool) -> Self {
        Self::TokenMismatch {
            url: url.into(),
            retried,
        }
    }

    /// Creates a session-expired error.
    pub fn session_expired(url: impl Into<String>) -> Self {
        Self::SessionExpired { url: url.into() }
    }

    /// Creates a domain error.
    pub fn domain(url: impl Into<String>, status: u16, message: Option<String>) -> Self {
        Self::Domain {
            url: url.into(),
            status,
            message,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Failure classification.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation { .. } => FailureKind::Validation,
            Self::SessionExpired { .. } => FailureKind::SessionExpired,
            Self::TokenMismatch { .. } => FailureKind::TokenMismatch,
            Self::TokenAcquisition(_) => FailureKind::TokenAcquisition,
            Self::Transport { .. }
            | Self::Timeout { .. }
            | Self::InvalidUrl { .. }
            | Self::Encode { .. } => FailureKind::Transport,
            Self::Domain { .. } | Self::Decode { .. } => FailureKind::Domain,
        }
    }

    /// Returns true for outcomes that are ordinary control flow rather than
    /// faults: validation feedback and an expired session.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::Validation | FailureKind::SessionExpired
        )
    }

    /// HTTP status associated with this error, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { .. } => Some(422),
            Self::SessionExpired { .. } => Some(401),
            Self::TokenMismatch { .. } => Some(419),
            Self::Domain { status, .. } => Some(*status),
            Self::TokenAcquisition(error) => error.status(),
            Self::Transport { .. }
            | Self::Timeout { .. }
            | Self::Decode { .. }
            | Self::Encode { .. }
            | Self::InvalidUrl { .. } => None,
        }
    }

    /// Per-field validation messages; `None` for every other kind.
    #[must_use]
    pub fn field_errors(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Message suitable for showing to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation {
                message, errors, ..
            } => {
                if !message.is_empty() {
                    return message.clone();
                }
                errors
                    .values()
                    .flatten()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| "The given data was invalid.".to_string())
            }
            Self::SessionExpired { .. } => "Your session has expired. Please log in again.".into(),
            Self::TokenMismatch { .. } => {
                "Your security token expired. Please try again.".into()
            }
            Self::TokenAcquisition(_) => {
                "Could not start a secure session with the server.".into()
            }
            Self::Transport { .. } | Self::Timeout { .. } => {
                "Network error. Please check your connection.".into()
            }
            Self::Domain {
                message: Some(message),
                ..
            } if !message.is_empty() => message.clone(),
            Self::Domain { status, .. } => format!("Request failed (HTTP {status})."),
            Self::Decode { .. } => "Unexpected response from the server.".into(),
            Self::Encode { .. } | Self::InvalidUrl { .. } => "Invalid request.".into(),
        }
    }
}
