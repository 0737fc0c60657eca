//! Outbound request envelope and body types.
//!
//! A [`RequestEnvelope`] is everything needed to transmit (and re-transmit) one
//! logical request: method, target, query, headers, body and its CSRF retry
//! state. Bodies are kept as owned data, never as a consumed stream, so a
//! resubmission after a token mismatch sends exactly the same payload.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tracing::warn;

/// Retry state of a request with respect to token-mismatch recovery.
///
/// The bound is one resubmission: once `Retried`, a further mismatch is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsrfRetry {
    /// The request has not been resubmitted for a token mismatch.
    #[default]
    NotRetried,
    /// The request has already been resubmitted once.
    Retried,
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// A multipart/form-data payload.
///
/// Rebuilt into a fresh [`Form`] for every transmission; the transport picks
/// the boundary, so callers never set the content type themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBody {
    parts: Vec<MultipartPart>,
}

impl MultipartBody {
    /// Creates an empty multipart body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a body from form fields, skipping null and empty-string values.
    ///
    /// Strings are sent as-is, booleans and numbers in their JSON rendering,
    /// and nested values as compact JSON.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a serde_json::Value)>,
    {
        let mut body = Self::new();
        for (name, value) in fields {
            let rendered = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(text) if text.is_empty() => continue,
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            body = body.text(name, rendered);
        }
        body
    }

    /// Adds a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a file field.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type,
            bytes,
        });
        self
    }

    /// Number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true when the body has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns the value of text field `name`, if present.
    #[must_use]
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            MultipartPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub(crate) fn to_form(&self) -> Form {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                MultipartPart::Text { name, value } => form.text(name.clone(), value.clone()),
                MultipartPart::File {
                    name,
                    file_name,
                    content_type,
                    bytes,
                } => form.part(name.clone(), file_part(file_name, content_type.as_deref(), bytes)),
            };
        }
        form
    }
}

fn file_part(file_name: &str, content_type: Option<&str>, bytes: &[u8]) -> Part {
    let part = Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
    let Some(mime) = content_type else {
        return part;
    };
    match part.mime_str(mime) {
        Ok(part) => part,
        Err(error) => {
            warn!(file = %file_name, mime = %mime, error = %error, "invalid part content type, sending without one");
            Part::bytes(bytes.to_vec()).file_name(file_name.to_string())
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// Serialized JSON document.
    Json(Vec<u8>),
    /// multipart/form-data payload.
    Multipart(MultipartBody),
}

impl RequestBody {
    /// Serializes `value` as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns the serializer error when `value` cannot be rendered as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Json(serde_json::to_vec(value)?))
    }

    /// Returns true for multipart bodies.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

/// An outbound request and its CSRF retry state.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    method: Method,
    target: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: RequestBody,
    retry: CsrfRetry,
}

impl RequestEnvelope {
    /// Creates an envelope for `method` on `target` (a path relative to the
    /// API base, or an absolute URL).
    #[must_use]
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            retry: CsrfRetry::NotRetried,
        }
    }

    /// Shorthand for a GET envelope.
    #[must_use]
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target path or URL.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Query parameters in insertion order.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Headers that will be sent.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body.
    #[must_use]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Current CSRF retry state.
    #[must_use]
    pub fn retry(&self) -> CsrfRetry {
        self.retry
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retry = CsrfRetry::Retried;
    }
}
