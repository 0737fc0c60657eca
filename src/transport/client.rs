//! HTTP client with the token gate and response classifier wired in.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::HeaderName;
use reqwest::{Client, Method};
use serde::Serialize;
use tracing::{debug, error, instrument};
use url::Url;

use super::classify::{self, ResponseClass, RetryDecision};
use super::envelope::{CsrfRetry, MultipartBody, RequestBody, RequestEnvelope};
use super::error::ApiError;
use super::gate;
use super::response::ApiResponse;
use crate::config::ClientConfig;
use crate::cookies::CookieReader;
use crate::csrf::TokenBroker;
use crate::user_agent;

/// API client sharing one cookie jar with its token broker.
///
/// Clones share the jar, the connection pool and the broker's in-flight
/// slot, so one client (or its clones) should be used per backend session.
///
/// # Example
///
/// ```no_run
/// use xsrf_session::{ApiClient, ClientConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new(ClientConfig::new("http://localhost:8000/api")?)?;
/// let created = client
///     .post_json("/event", &serde_json::json!({"name": "Posyandu"}))
///     .await?;
/// println!("HTTP {}", created.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<ClientConfig>,
    broker: TokenBroker,
    cookies: CookieReader,
    csrf_header: HeaderName,
}

impl ApiClient {
    /// Creates a client with a fresh, empty cookie jar.
    ///
    /// # Errors
    ///
    /// Returns the builder error when the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        Self::with_cookie_jar(config, Arc::new(Jar::default()))
    }

    /// Creates a client over an existing cookie jar.
    ///
    /// # Errors
    ///
    /// Returns the builder error when the HTTP client cannot be constructed.
    #[instrument(level = "debug", skip(config, jar), fields(base_url = %config.base_url()))]
    pub fn with_cookie_jar(config: ClientConfig, jar: Arc<Jar>) -> Result<Self, reqwest::Error> {
        let http = build_client(
            Arc::clone(&jar),
            config.connect_timeout(),
            config.read_timeout(),
        )?;
        let cookies = CookieReader::new(jar, config.app_base_url());
        let broker = TokenBroker::new(http.clone(), cookies.clone(), &config);
        let csrf_header = config.csrf_header_name();
        Ok(Self {
            http,
            config: Arc::new(config),
            broker,
            cookies,
            csrf_header,
        })
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token broker shared by every request this client sends.
    #[must_use]
    pub fn broker(&self) -> &TokenBroker {
        &self.broker
    }

    /// Cookie accessor over the client's jar.
    #[must_use]
    pub fn cookies(&self) -> &CookieReader {
        &self.cookies
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn get(&self, target: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestEnvelope::get(target)).await
    }

    /// Sends a GET request with query parameters.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn get_with_query(
        &self,
        target: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse, ApiError> {
        let envelope = query
            .iter()
            .fold(RequestEnvelope::get(target), |envelope, (key, value)| {
                envelope.with_query(*key, *value)
            });
        self.send(envelope).await
    }

    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &T,
    ) -> Result<ApiResponse, ApiError> {
        self.send_json(Method::POST, target, body).await
    }

    /// Sends a POST request without a body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn post_empty(&self, target: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestEnvelope::new(Method::POST, target)).await
    }

    /// Sends a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &T,
    ) -> Result<ApiResponse, ApiError> {
        self.send_json(Method::PUT, target, body).await
    }

    /// Sends a PATCH request with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &T,
    ) -> Result<ApiResponse, ApiError> {
        self.send_json(Method::PATCH, target, body).await
    }

    /// Sends a DELETE request.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn delete(&self, target: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestEnvelope::new(Method::DELETE, target)).await
    }

    /// Sends a POST request with a multipart body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn post_multipart(
        &self,
        target: &str,
        body: MultipartBody,
    ) -> Result<ApiResponse, ApiError> {
        self.send(
            RequestEnvelope::new(Method::POST, target).with_body(RequestBody::Multipart(body)),
        )
        .await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        target: &str,
        body: &T,
    ) -> Result<ApiResponse, ApiError> {
        let body = RequestBody::json(body).map_err(|source| ApiError::Encode {
            url: self.config.resolve(target),
            source,
        })?;
        self.send(RequestEnvelope::new(method, target).with_body(body))
            .await
    }

    /// Sends a request through the gate and classifies the response.
    ///
    /// A token mismatch (419) on a request that has not been resubmitted
    /// triggers one token refresh and one resubmission of the same envelope,
    /// straight to the transport.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] matching the failure; see
    /// [`ApiError::kind`] for the taxonomy.
    #[instrument(skip(self, envelope), fields(method = %envelope.method(), target = %envelope.target()))]
    pub async fn send(&self, mut envelope: RequestEnvelope) -> Result<ApiResponse, ApiError> {
        let url = self.request_url(&envelope)?;
        gate::prepare(&mut envelope, &self.broker, &self.csrf_header, url.as_str()).await?;
        let identity_check = self.config.is_identity_target(envelope.target());

        loop {
            let outcome = self.transmit(&envelope, &url).await;
            let resubmitted = envelope.retry() == CsrfRetry::Retried;
            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    if resubmitted {
                        error!(url = %url, error = %err, "CSRF retry failed");
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            match classify::classify_status(status, identity_check) {
                ResponseClass::Success => return Ok(response),
                ResponseClass::TokenMismatch => {
                    if let RetryDecision::DoNotRetry { reason } =
                        classify::retry_decision(envelope.retry())
                    {
                        error!(url = %url, reason, "CSRF token mismatch, giving up");
                        return Err(ApiError::token_mismatch(url.as_str(), true));
                    }
                    debug!(url = %url, "CSRF token mismatch, refreshing token and retrying once");
                    envelope.mark_retried();
                    self.refresh_for_retry(&mut envelope, url.as_str()).await?;
                }
                ResponseClass::Validation | ResponseClass::SessionExpired | ResponseClass::Failure => {
                    let err = classify::error_for_response(
                        url.as_str(),
                        status,
                        response.body(),
                        identity_check,
                        envelope.retry(),
                    );
                    if resubmitted {
                        error!(url = %url, status, "CSRF retry failed");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn refresh_for_retry(
        &self,
        envelope: &mut RequestEnvelope,
        url: &str,
    ) -> Result<(), ApiError> {
        let fresh = self.broker.ensure_fresh_token().await.map_err(|err| {
            error!(url = %url, error = %err, "CSRF token refresh failed");
            ApiError::from(err)
        })?;
        let Some(token) = fresh.or_else(|| self.broker.current_token()) else {
            error!(url = %url, "failed to get CSRF token for retry");
            return Err(ApiError::token_mismatch(url, false));
        };
        gate::attach_token(envelope, &self.csrf_header, &token);
        gate::apply_standard_headers(envelope);
        Ok(())
    }

    fn request_url(&self, envelope: &RequestEnvelope) -> Result<Url, ApiError> {
        let resolved = self.config.resolve(envelope.target());
        let mut url = Url::parse(&resolved).map_err(|_| ApiError::invalid_url(&resolved))?;
        if !envelope.query().is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in envelope.query() {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn transmit(
        &self,
        envelope: &RequestEnvelope,
        url: &Url,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = self
            .http
            .request(envelope.method().clone(), url.clone())
            .headers(envelope.headers().clone());
        request = match envelope.body() {
            RequestBody::Empty => request,
            RequestBody::Json(bytes) => request.body(bytes.clone()),
            RequestBody::Multipart(body) => request.multipart(body.to_form()),
        };

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::transport(url.as_str(), err))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::transport(url.as_str(), err))?;
        debug!(status, bytes = body.len(), "response received");
        Ok(ApiResponse::new(
            url.to_string(),
            status,
            headers,
            body.to_vec(),
        ))
    }
}

fn build_client(
    jar: Arc<Jar>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .cookie_provider(jar)
        .build()
}
