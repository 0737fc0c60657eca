//! Inbound response classification and the token-mismatch retry policy.
//!
//! Classification is a pure function of the status code and whether the
//! request targeted the identity endpoint; [`retry_decision`] decides whether
//! a token mismatch may be recovered. The client owns the side effects
//! (refreshing the token and resubmitting).

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use super::envelope::CsrfRetry;
use super::error::ApiError;

/// HTTP status the backend uses for a rejected anti-forgery token.
pub const TOKEN_MISMATCH_STATUS: u16 = 419;

/// HTTP status for field-level validation failures.
pub const VALIDATION_STATUS: u16 = 422;

/// HTTP status for a missing or expired session.
pub const UNAUTHENTICATED_STATUS: u16 = 401;

/// What a response status means to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx.
    Success,
    /// 422: validation feedback.
    Validation,
    /// 401 on the identity endpoint: no session, handled quietly.
    SessionExpired,
    /// 419: token mismatch, eligible for one recovery.
    TokenMismatch,
    /// Anything else.
    Failure,
}

/// Whether a token-mismatch response should be resubmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Refresh the token and resubmit once.
    Resubmit,
    /// Surface the mismatch.
    DoNotRetry {
        /// Human-readable reason.
        reason: &'static str,
    },
}

/// Classifies a response status.
#[must_use]
pub fn classify_status(status: u16, identity_check: bool) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        VALIDATION_STATUS => ResponseClass::Validation,
        UNAUTHENTICATED_STATUS if identity_check => ResponseClass::SessionExpired,
        TOKEN_MISMATCH_STATUS => ResponseClass::TokenMismatch,
        _ => ResponseClass::Failure,
    }
}

/// Decides whether a token mismatch may be recovered given the request's
/// retry state. At most one resubmission per logical request.
#[must_use]
pub fn retry_decision(retry: CsrfRetry) -> RetryDecision {
    match retry {
        CsrfRetry::NotRetried => RetryDecision::Resubmit,
        CsrfRetry::Retried => RetryDecision::DoNotRetry {
            reason: "CSRF retry limit reached",
        },
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, FieldMessages>,
}

/// Validation messages arrive as a list per field, occasionally as a bare
/// string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldMessages {
    Many(Vec<String>),
    One(String),
}

impl FieldMessages {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Many(messages) => messages,
            Self::One(message) => vec![message],
        }
    }
}

fn parse_error_body(body: &[u8]) -> ErrorBody {
    serde_json::from_slice(body).unwrap_or_default()
}

/// Builds the error for a non-success response that will not be retried.
///
/// A token mismatch reaching this point is terminal; `retry` records whether
/// it was already resubmitted.
#[must_use]
pub fn error_for_response(
    url: &str,
    status: u16,
    body: &[u8],
    identity_check: bool,
    retry: CsrfRetry,
) -> ApiError {
    match classify_status(status, identity_check) {
        ResponseClass::Validation => {
            let parsed = parse_error_body(body);
            let errors: BTreeMap<String, Vec<String>> = parsed
                .errors
                .into_iter()
                .map(|(field, messages)| (field, messages.into_vec()))
                .collect();
            debug!(url = %url, fields = errors.len(), "validation error");
            ApiError::Validation {
                url: url.to_string(),
                message: parsed.message.unwrap_or_default(),
                errors,
            }
        }
        ResponseClass::SessionExpired => ApiError::session_expired(url),
        ResponseClass::TokenMismatch => {
            ApiError::token_mismatch(url, retry == CsrfRetry::Retried)
        }
        ResponseClass::Success | ResponseClass::Failure => {
            ApiError::domain(url, status, parse_error_body(body).message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FailureKind;

    #[test]
    fn test_classify_status_success_range() {
        assert_eq!(classify_status(200, false), ResponseClass::Success);
        assert_eq!(classify_status(204, true), ResponseClass::Success);
    }

    #[test]
    fn test_classify_401_depends_on_identity_target() {
        assert_eq!(classify_status(401, true), ResponseClass::SessionExpired);
        assert_eq!(classify_status(401, false), ResponseClass::Failure);
    }

    #[test]
    fn test_classify_special_statuses() {
        assert_eq!(classify_status(422, false), ResponseClass::Validation);
        assert_eq!(classify_status(419, false), ResponseClass::TokenMismatch);
        assert_eq!(classify_status(419, true), ResponseClass::TokenMismatch);
        assert_eq!(classify_status(500, false), ResponseClass::Failure);
        assert_eq!(classify_status(403, true), ResponseClass::Failure);
    }

    #[test]
    fn test_retry_decision_bounded_to_one() {
        assert_eq!(retry_decision(CsrfRetry::NotRetried), RetryDecision::Resubmit);
        assert!(matches!(
            retry_decision(CsrfRetry::Retried),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_validation_body_parsed() {
        let body = br#"{"message":"The email field is required.","errors":{"email":["The email field is required."],"password":"Too short."}}"#;
        let error = error_for_response("u", 422, body, false, CsrfRetry::NotRetried);
        match &error {
            ApiError::Validation {
                message, errors, ..
            } => {
                assert_eq!(message, "The email field is required.");
                assert_eq!(errors["email"], vec!["The email field is required."]);
                assert_eq!(errors["password"], vec!["Too short."]);
            }
            other => panic!("Expected Validation, got: {other:?}"),
        }
        assert!(error.is_expected());
    }

    #[test]
    fn test_validation_with_non_json_body() {
        let error = error_for_response("u", 422, b"<html>", false, CsrfRetry::NotRetried);
        assert_eq!(error.kind(), FailureKind::Validation);
        assert_eq!(error.field_errors().map(BTreeMap::len), Some(0));
    }

    #[test]
    fn test_domain_error_carries_message() {
        let error = error_for_response(
            "u",
            403,
            br#"{"message":"This action is unauthorized."}"#,
            false,
            CsrfRetry::NotRetried,
        );
        match error {
            ApiError::Domain {
                status, message, ..
            } => {
                assert_eq!(status, 403);
                assert_eq!(message.as_deref(), Some("This action is unauthorized."));
            }
            other => panic!("Expected Domain, got: {other:?}"),
        }
    }

    #[test]
    fn test_terminal_mismatch_records_retry_state() {
        let error = error_for_response("u", 419, b"", false, CsrfRetry::Retried);
        assert!(matches!(error, ApiError::TokenMismatch { retried: true, .. }));
    }

    #[test]
    fn test_401_outside_identity_is_domain() {
        let error = error_for_response("u", 401, b"", false, CsrfRetry::NotRetried);
        assert_eq!(error.kind(), FailureKind::Domain);
        let error = error_for_response("u", 401, b"", true, CsrfRetry::NotRetried);
        assert_eq!(error.kind(), FailureKind::SessionExpired);
    }
}
