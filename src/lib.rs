//! xsrf-session Core Library
//!
//! Client half of a cookie-session authentication scheme: a double-submit
//! CSRF token delivered through a cookie and echoed back in a header on every
//! state-changing request.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`cookies`] - Reads named cookies out of the shared cookie jar
//! - [`csrf`] - Single-flight token broker
//! - [`transport`] - Request gate, response classifier and the retry-once policy
//! - [`session`] - Authentication session lifecycle and the durable auth hint
//! - [`guard`] - Route guard decisions built on the session
//! - [`query`] - Superseding (latest-only) queries such as global search
//! - [`config`] - Client configuration and endpoint resolution

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cookies;
pub mod csrf;
pub mod guard;
pub mod query;
pub mod session;
#[cfg(test)]
mod test_support;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use config::{ClientConfig, ConfigError, SettleStrategy};
pub use cookies::CookieReader;
pub use csrf::{CsrfToken, TokenAcquisitionError, TokenBroker};
pub use guard::{GuardDecision, RouteMeta, authorize};
pub use query::{LatestOnly, SearchOutcome, SearchResults, SearchService, Superseded};
pub use session::{
    AuthSession, Credentials, FileHintStore, HintError, HintStore, Identity, LoginOutcome,
    MemoryHintStore, Navigator, NoopNavigator, Notice, NoticeKind, Route, SessionState,
};
pub use transport::{
    ApiClient, ApiError, ApiResponse, CsrfRetry, FailureKind, MultipartBody, RequestBody,
    RequestEnvelope,
};
