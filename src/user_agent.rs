//! Client identification headers shared by the transport and the token broker.
//!
//! Backends of this kind answer programmatic clients (`X-Requested-With`)
//! with JSON errors instead of HTML redirects, so every request carries it.

/// Header marking the request as a programmatic (XHR-style) call.
pub(crate) const REQUESTED_WITH_HEADER: &str = "X-Requested-With";

/// Value of [`REQUESTED_WITH_HEADER`].
pub(crate) const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";

/// Default User-Agent for all requests (identifies the tool and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
