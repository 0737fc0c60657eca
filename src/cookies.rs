//! Cookie accessor over the shared reqwest cookie jar.
//!
//! The jar plays the role of the browser's ambient cookie store: the backend
//! writes the token cookie into it through `Set-Cookie`, and [`CookieReader`]
//! reads it back out. Lookups always reflect the jar's current state.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use url::Url;

/// Reads named cookie values for a fixed origin from a shared jar.
#[derive(Debug, Clone)]
pub struct CookieReader {
    jar: Arc<Jar>,
    origin: Url,
}

impl CookieReader {
    /// Creates a reader that looks up cookies the jar would send to `origin`.
    #[must_use]
    pub fn new(jar: Arc<Jar>, origin: Url) -> Self {
        Self { jar, origin }
    }

    /// Returns the shared jar.
    #[must_use]
    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// Returns the raw (still URL-encoded) value of cookie `name`, if present.
    #[must_use]
    pub fn read(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        let cookie_string = header.to_str().ok()?;
        cookie_value(cookie_string, name).map(str::to_string)
    }
}

/// Extracts cookie `name` from a `Cookie`-header style string
/// (`a=1; b=2`).
///
/// The first pair whose name matches wins. Only the name is split off, so
/// values containing `=` survive intact.
#[must_use]
pub fn cookie_value<'a>(cookie_string: &'a str, name: &str) -> Option<&'a str> {
    if name.is_empty() {
        return None;
    }
    let needle = format!("{name}=");
    let mut rest = cookie_string;
    loop {
        let pair = rest.trim_start_matches([' ', ';']);
        if pair.is_empty() {
            return None;
        }
        let (current, tail) = pair.split_once(';').unwrap_or((pair, ""));
        if let Some(value) = current.strip_prefix(&needle) {
            return Some(value.trim_end());
        }
        rest = tail;
    }
}
