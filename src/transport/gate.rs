//! Outbound request gate.
//!
//! Runs once per logical request before it reaches the transport: mutating
//! methods get a freshly issued token echoed in the token header, every
//! request is marked as a programmatic call, and content headers are set to
//! match the body.

use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue};
use tracing::{debug, warn};

use super::envelope::{RequestBody, RequestEnvelope};
use crate::csrf::{CsrfToken, TokenBroker};
use crate::user_agent::{REQUESTED_WITH_HEADER, REQUESTED_WITH_VALUE};

const JSON: &str = "application/json";

/// Returns true for methods that change server state and therefore carry the
/// anti-forgery token.
#[must_use]
pub fn requires_token(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Prepares `envelope` for its first transmission.
///
/// For mutating methods this always requests a fresh token (joining any
/// acquisition already in flight), reads the cookie, and retries the
/// acquisition once if the cookie is still absent. A request that ends up
/// with no token is sent without the header.
///
/// # Errors
///
/// Returns [`crate::csrf::TokenAcquisitionError`] when the token endpoint
/// fails; the request is not sent.
pub(crate) async fn prepare(
    envelope: &mut RequestEnvelope,
    broker: &TokenBroker,
    header: &HeaderName,
    url: &str,
) -> Result<(), crate::csrf::TokenAcquisitionError> {
    if requires_token(envelope.method()) {
        broker.ensure_fresh_token().await?;
        let mut token = broker.current_token();
        if token.is_none() {
            debug!(url = %url, "token cookie missing after refresh, requesting again");
            broker.ensure_fresh_token().await?;
            token = broker.current_token();
        }
        match token {
            Some(token) => attach_token(envelope, header, &token),
            None => warn!(
                method = %envelope.method(),
                url = %url,
                "could not obtain CSRF token, sending without it"
            ),
        }
    }
    apply_standard_headers(envelope);
    Ok(())
}

/// Sets the token header to the decoded token value, replacing any previous
/// value.
pub(crate) fn attach_token(envelope: &mut RequestEnvelope, header: &HeaderName, token: &CsrfToken) {
    match HeaderValue::from_str(token.header_value()) {
        Ok(mut value) => {
            value.set_sensitive(true);
            envelope.headers_mut().insert(header.clone(), value);
        }
        Err(_) => warn!(
            header = %header,
            "CSRF token is not a valid header value, sending without it"
        ),
    }
}

/// Applies identification and content headers.
///
/// Caller-supplied `X-Requested-With`, `Accept` and `Content-Type` are kept;
/// multipart bodies never carry an explicit `Content-Type` so the transport
/// can add the boundary.
pub(crate) fn apply_standard_headers(envelope: &mut RequestEnvelope) {
    let is_multipart = envelope.body().is_multipart();
    let has_json_body = matches!(envelope.body(), RequestBody::Json(_));
    let wants_json_content_type = has_json_body
        && matches!(*envelope.method(), Method::POST | Method::PUT | Method::PATCH);

    let headers = envelope.headers_mut();
    headers
        .entry(REQUESTED_WITH_HEADER)
        .or_insert_with(|| HeaderValue::from_static(REQUESTED_WITH_VALUE));
    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
    }
    if is_multipart {
        headers.remove(CONTENT_TYPE);
    } else if wants_json_content_type && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MultipartBody;

    #[test]
    fn test_requires_token_for_mutating_methods() {
        assert!(requires_token(&Method::POST));
        assert!(requires_token(&Method::PUT));
        assert!(requires_token(&Method::PATCH));
        assert!(requires_token(&Method::DELETE));
        assert!(!requires_token(&Method::GET));
        assert!(!requires_token(&Method::HEAD));
        assert!(!requires_token(&Method::OPTIONS));
    }

    #[test]
    fn test_standard_headers_for_json_post() {
        let mut envelope = RequestEnvelope::new(Method::POST, "/event")
            .with_body(RequestBody::Json(b"{}".to_vec()));
        apply_standard_headers(&mut envelope);

        let headers = envelope.headers();
        assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(headers[ACCEPT], JSON);
        assert_eq!(headers[CONTENT_TYPE], JSON);
    }

    #[test]
    fn test_standard_headers_keep_caller_accept() {
        let mut envelope = RequestEnvelope::get("/report")
            .with_header(ACCEPT, HeaderValue::from_static("text/csv"));
        apply_standard_headers(&mut envelope);

        assert_eq!(envelope.headers()[ACCEPT], "text/csv");
        assert!(envelope.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_standard_headers_keep_caller_requested_with() {
        let mut envelope = RequestEnvelope::new(Method::POST, "/event")
            .with_header(
                HeaderName::from_static("x-requested-with"),
                HeaderValue::from_static("Fetch"),
            )
            .with_body(RequestBody::Json(b"{}".to_vec()));
        apply_standard_headers(&mut envelope);

        let headers = envelope.headers();
        assert_eq!(headers.get_all("x-requested-with").iter().count(), 1);
        assert_eq!(headers["x-requested-with"], "Fetch");
    }

    #[test]
    fn test_multipart_strips_content_type() {
        let mut envelope = RequestEnvelope::new(Method::POST, "/user")
            .with_header(CONTENT_TYPE, HeaderValue::from_static(JSON))
            .with_body(RequestBody::Multipart(MultipartBody::new().text("name", "Budi")));
        apply_standard_headers(&mut envelope);

        assert!(envelope.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(envelope.headers()["x-requested-with"], "XMLHttpRequest");
    }

    #[test]
    fn test_attach_token_uses_decoded_value() {
        let mut envelope = RequestEnvelope::new(Method::DELETE, "/event/1");
        let header = HeaderName::from_static("x-xsrf-token");
        attach_token(&mut envelope, &header, &CsrfToken::from_cookie("abc%3D%3D"));
        assert_eq!(envelope.headers()["x-xsrf-token"], "abc==");
        assert!(envelope.headers()["x-xsrf-token"].is_sensitive());

        attach_token(&mut envelope, &header, &CsrfToken::from_cookie("rotated"));
        assert_eq!(envelope.headers().get_all("x-xsrf-token").iter().count(), 1);
        assert_eq!(envelope.headers()["x-xsrf-token"], "rotated");
    }
}
