//! Request transport: the outbound gate, the HTTP client and the inbound
//! response classifier.
//!
//! Every request flows through [`ApiClient::send`]:
//!
//! 1. The gate attaches a freshly issued anti-forgery token to mutating
//!    requests (`POST`, `PUT`, `PATCH`, `DELETE`) and sets identification and
//!    content headers.
//! 2. The request is transmitted over the shared cookie jar.
//! 3. The response is classified. A token mismatch (419) is recovered by
//!    refreshing the token and resubmitting once; everything else becomes an
//!    [`ApiError`] with a [`FailureKind`].

mod classify;
mod client;
mod envelope;
mod error;
mod gate;
mod response;

pub use classify::{
    ResponseClass, RetryDecision, TOKEN_MISMATCH_STATUS, UNAUTHENTICATED_STATUS,
    VALIDATION_STATUS, classify_status, retry_decision,
};
pub use client::ApiClient;
pub use envelope::{CsrfRetry, MultipartBody, RequestBody, RequestEnvelope};
pub use error::{ApiError, FailureKind};
pub use gate::requires_token;
pub use response::ApiResponse;
