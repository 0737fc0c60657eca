//! The anti-forgery token value.

use std::fmt;

use tracing::debug;

/// A token read from the token cookie.
///
/// The cookie stores the value URL-encoded; the header carries it decoded.
/// The value is redacted in Debug output to keep it out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken {
    raw: String,
    decoded: String,
}

impl CsrfToken {
    /// Builds a token from the raw cookie value.
    ///
    /// A value that is not valid percent-encoding is used verbatim.
    #[must_use]
    pub fn from_cookie(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let decoded = match urlencoding::decode(&raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(error) => {
                debug!(error = %error, "token cookie is not valid percent-encoding, using raw value");
                raw.clone()
            }
        };
        Self { raw, decoded }
    }

    /// The value exactly as stored in the cookie.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The URL-decoded value to send in the token header.
    #[must_use]
    pub fn header_value(&self) -> &str {
        &self.decoded
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfToken")
            .field("raw", &"[REDACTED]")
            .field("len", &self.raw.len())
            .finish()
    }
}
