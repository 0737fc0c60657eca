//! Client configuration and endpoint resolution.
//!
//! [`ClientConfig`] carries everything the transport, the token broker and the
//! session need to know about the backend: where the API lives, where the
//! token-issuing endpoint lives, the cookie/header names of the double-submit
//! pair and the HTTP timeouts.

use std::time::Duration;

use reqwest::header::HeaderName;
use thiserror::Error;
use url::Url;

/// Default API base URL (the backend serves its JSON API under `/api`).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Default token-issuing endpoint, relative to the application origin.
pub const DEFAULT_CSRF_PATH: &str = "/sanctum/csrf-cookie";

/// Cookie the backend writes the anti-forgery token into.
pub const DEFAULT_CSRF_COOKIE: &str = "XSRF-TOKEN";

/// Header the decoded token is echoed back in.
pub const DEFAULT_CSRF_HEADER: &str = "X-XSRF-TOKEN";

/// Default identity-check endpoint, relative to the API base.
pub const DEFAULT_IDENTITY_PATH: &str = "/me";

/// Default login endpoint, relative to the API base.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Default logout endpoint, relative to the API base.
pub const DEFAULT_LOGOUT_PATH: &str = "/logout";

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (30 seconds).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Default poll interval while waiting for the token cookie to appear.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Default upper bound on waiting for the token cookie to appear.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors raised while building a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL could not be parsed.
    #[error("invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        /// The offending URL string.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The base URL cannot carry a path (e.g. `mailto:`).
    #[error("base URL '{url}' cannot be used as an HTTP base")]
    UnsupportedBaseUrl {
        /// The offending URL string.
        url: String,
    },

    /// A header or cookie name is empty.
    #[error("{field} must not be empty")]
    EmptyName {
        /// Which field was empty.
        field: &'static str,
    },

    /// The token header name is not a valid HTTP header name.
    #[error("'{name}' is not a valid HTTP header name")]
    InvalidHeaderName {
        /// The offending name.
        name: String,
    },
}

/// How the token broker waits for the cookie write after the token endpoint
/// responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    /// Do not wait; read the jar immediately.
    Immediate,
    /// Sleep for a fixed duration, then read the jar once.
    Fixed(Duration),
    /// Re-read the jar every `interval` until the cookie is present or
    /// `timeout` has elapsed.
    Poll {
        /// Delay between reads.
        interval: Duration,
        /// Upper bound on the total wait.
        timeout: Duration,
    },
}

impl Default for SettleStrategy {
    fn default() -> Self {
        Self::Poll {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    csrf_path: String,
    csrf_cookie: String,
    csrf_header: String,
    identity_path: String,
    login_path: String,
    logout_path: String,
    settle: SettleStrategy,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration for the given API base URL with default
    /// endpoint paths and names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] when `base_url` does not parse
    /// and [`ConfigError::UnsupportedBaseUrl`] when it cannot carry a path.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::UnsupportedBaseUrl {
                url: base_url.to_string(),
            });
        }
        Ok(Self {
            base_url: parsed,
            csrf_path: DEFAULT_CSRF_PATH.to_string(),
            csrf_cookie: DEFAULT_CSRF_COOKIE.to_string(),
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
            identity_path: DEFAULT_IDENTITY_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            settle: SettleStrategy::default(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        })
    }

    /// Overrides the token-issuing endpoint path (relative to the app origin).
    #[must_use]
    pub fn with_csrf_path(mut self, path: impl Into<String>) -> Self {
        self.csrf_path = path.into();
        self
    }

    /// Overrides the cookie and header names of the double-submit pair.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyName`] when either name is blank and
    /// [`ConfigError::InvalidHeaderName`] when the header name is not a legal
    /// HTTP token.
    pub fn with_csrf_names(
        mut self,
        cookie: impl Into<String>,
        header: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let cookie = cookie.into();
        let header = header.into();
        if cookie.trim().is_empty() {
            return Err(ConfigError::EmptyName {
                field: "csrf cookie name",
            });
        }
        if header.trim().is_empty() {
            return Err(ConfigError::EmptyName {
                field: "csrf header name",
            });
        }
        if HeaderName::from_bytes(header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidHeaderName { name: header });
        }
        self.csrf_cookie = cookie;
        self.csrf_header = header;
        Ok(self)
    }

    /// Overrides the identity, login and logout endpoint paths.
    #[must_use]
    pub fn with_auth_paths(
        mut self,
        identity: impl Into<String>,
        login: impl Into<String>,
        logout: impl Into<String>,
    ) -> Self {
        self.identity_path = identity.into();
        self.login_path = login.into();
        self.logout_path = logout.into();
        self
    }

    /// Overrides how the broker waits for the token cookie.
    #[must_use]
    pub fn with_settle(mut self, settle: SettleStrategy) -> Self {
        self.settle = settle;
        self
    }

    /// Overrides connect and read timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Application origin: the base URL with a trailing `/api` segment removed.
    ///
    /// The token endpoint is served beside the API, not under it.
    #[must_use]
    pub fn app_base_url(&self) -> Url {
        let mut app = self.base_url.clone();
        let trimmed = app.path().trim_end_matches('/');
        let stripped = trimmed.strip_suffix("/api").unwrap_or(trimmed).to_string();
        app.set_path(&stripped);
        app
    }

    /// Name of the token cookie.
    #[must_use]
    pub fn csrf_cookie(&self) -> &str {
        &self.csrf_cookie
    }

    /// Name of the token header.
    #[must_use]
    pub fn csrf_header(&self) -> &str {
        &self.csrf_header
    }

    /// Name of the token header as a parsed [`HeaderName`].
    ///
    /// Falls back to the default header when the stored name does not parse,
    /// which [`Self::with_csrf_names`] already rules out.
    #[must_use]
    pub fn csrf_header_name(&self) -> HeaderName {
        HeaderName::from_bytes(self.csrf_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-xsrf-token"))
    }

    /// Identity endpoint path.
    #[must_use]
    pub fn identity_path(&self) -> &str {
        &self.identity_path
    }

    /// Login endpoint path.
    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Logout endpoint path.
    #[must_use]
    pub fn logout_path(&self) -> &str {
        &self.logout_path
    }

    /// Cookie settle strategy.
    #[must_use]
    pub fn settle(&self) -> SettleStrategy {
        self.settle
    }

    /// HTTP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// HTTP read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Absolute URL of the token-issuing endpoint.
    #[must_use]
    pub fn csrf_url(&self) -> String {
        join_path(&self.app_base_url(), &self.csrf_path)
    }

    /// Resolves a request target against the API base.
    ///
    /// Absolute `http(s)://` targets pass through untouched; anything else is
    /// appended to the base path (`/api` + `/me` = `/api/me`).
    #[must_use]
    pub fn resolve(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            return target.to_string();
        }
        join_path(&self.base_url, target)
    }

    /// Returns true when `target` addresses the identity-check endpoint.
    #[must_use]
    pub fn is_identity_target(&self, target: &str) -> bool {
        normalize_path(target) == normalize_path(&self.identity_path)
            || self.resolve(target) == self.resolve(&self.identity_path)
    }
}

fn join_path(base: &Url, path: &str) -> String {
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/').trim_end_matches('/')
}
