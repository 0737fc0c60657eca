//! Transient user-facing notices.
//!
//! The crate owns no timers: a notice carries its own time-to-live and the
//! caller decides when to hide it.

use std::time::Duration;

use crate::transport::ApiError;

/// How long a success notice stays visible.
pub const SUCCESS_TTL: Duration = Duration::from_secs(3);

/// How long an error notice stays visible.
pub const ERROR_TTL: Duration = Duration::from_secs(5);

/// Notice severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Error,
}

/// A message to show the user for `ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub kind: NoticeKind,
    /// Presentation-ready text.
    pub message: String,
    /// Display duration.
    pub ttl: Duration,
}

impl Notice {
    /// Success notice with the default TTL.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
            ttl: SUCCESS_TTL,
        }
    }

    /// Error notice with the default TTL.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
            ttl: ERROR_TTL,
        }
    }

    /// Error notice for a failed request.
    #[must_use]
    pub fn from_error(error: &ApiError) -> Self {
        Self::error(error.user_message())
    }

    /// Returns true once `elapsed` has reached the TTL.
    #[must_use]
    pub fn is_expired(&self, elapsed: Duration) -> bool {
        elapsed >= self.ttl
    }
}
