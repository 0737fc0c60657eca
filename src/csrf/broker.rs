//! Single-flight token broker.
//!
//! At most one request to the token endpoint is in flight per broker. A
//! caller arriving while an acquisition is outstanding joins it instead of
//! starting its own, so a burst of concurrent mutations rotates the cookie
//! exactly once. The acquisition runs on its own task, so it settles even when
//! every caller has given up waiting. When it settles (success or failure) the
//! slot is cleared and the next caller starts a fresh one; there is no
//! time-based caching.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use reqwest::Client;
use reqwest::header::ACCEPT;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

use super::{CsrfToken, TokenAcquisitionError};
use crate::config::{ClientConfig, SettleStrategy};
use crate::cookies::CookieReader;
use crate::user_agent::{REQUESTED_WITH_HEADER, REQUESTED_WITH_VALUE};

type AcquisitionOutcome = Result<Option<CsrfToken>, TokenAcquisitionError>;
type Acquisition = Shared<BoxFuture<'static, AcquisitionOutcome>>;
type InFlightSlot = Mutex<Option<Acquisition>>;

/// Floor for [`SettleStrategy::Poll`] so a zero interval cannot spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Coordinates token acquisition for one cookie jar.
///
/// Cheap to clone; clones share the same in-flight slot. Create one per jar
/// and inject it wherever tokens are needed.
#[derive(Clone)]
pub struct TokenBroker {
    acquirer: Acquirer,
    in_flight: Arc<InFlightSlot>,
    started: Arc<AtomicU64>,
}

/// Everything one acquisition needs, detached from the broker so the spawned
/// task does not keep the slot alive.
#[derive(Debug, Clone)]
struct Acquirer {
    http: Client,
    endpoint: String,
    cookies: CookieReader,
    cookie_name: String,
    settle: SettleStrategy,
}

impl fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBroker")
            .field("endpoint", &self.acquirer.endpoint)
            .field("cookie_name", &self.acquirer.cookie_name)
            .field("in_flight", &self.is_acquiring())
            .field("started", &self.acquisitions_started())
            .finish()
    }
}

impl TokenBroker {
    /// Creates a broker that requests tokens with `http` and reads them back
    /// through `cookies`.
    ///
    /// `http` must share the jar behind `cookies`, otherwise the issued cookie
    /// never becomes visible.
    #[must_use]
    pub fn new(http: Client, cookies: CookieReader, config: &ClientConfig) -> Self {
        Self {
            acquirer: Acquirer {
                http,
                endpoint: config.csrf_url(),
                cookies,
                cookie_name: config.csrf_cookie().to_string(),
                settle: config.settle(),
            },
            in_flight: Arc::new(Mutex::new(None)),
            started: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Obtains a freshly issued token.
    ///
    /// Joins the outstanding acquisition when one exists; otherwise requests
    /// the token endpoint, waits for the cookie to settle and reads it.
    /// Resolves to `None` when the endpoint succeeded but no cookie appeared.
    ///
    /// # Errors
    ///
    /// Returns [`TokenAcquisitionError`] when the endpoint is unreachable or
    /// answers with a non-success status. Every joined caller receives the
    /// same error.
    #[instrument(level = "debug", skip(self), fields(endpoint = %self.acquirer.endpoint))]
    pub async fn ensure_fresh_token(&self) -> AcquisitionOutcome {
        let acquisition = {
            let mut slot = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight CSRF acquisition");
                existing.clone()
            } else {
                let generation = self.started.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(generation, "starting CSRF acquisition");
                let acquisition = start_acquisition(
                    self.acquirer.clone(),
                    Arc::downgrade(&self.in_flight),
                );
                *slot = Some(acquisition.clone());
                acquisition
            }
        };
        acquisition.await
    }

    /// Reads the current token cookie without any network traffic.
    #[must_use]
    pub fn current_token(&self) -> Option<CsrfToken> {
        self.acquirer
            .cookies
            .read(&self.acquirer.cookie_name)
            .map(CsrfToken::from_cookie)
    }

    /// Returns true while an acquisition is outstanding.
    #[must_use]
    pub fn is_acquiring(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of acquisitions started (joins are not counted).
    #[must_use]
    pub fn acquisitions_started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}

/// Must be called from within a Tokio runtime.
fn start_acquisition(acquirer: Acquirer, slot: Weak<InFlightSlot>) -> Acquisition {
    let endpoint = acquirer.endpoint.clone();
    let task = tokio::spawn(async move {
        let _clear = ClearSlotOnExit(slot);
        acquirer.acquire().await
    });
    task.map(move |joined| {
        joined.unwrap_or_else(|error| {
            warn!(url = %endpoint, error = %error, "CSRF acquisition task did not finish");
            Err(TokenAcquisitionError::interrupted(endpoint))
        })
    })
    .boxed()
    .shared()
}

/// Empties the in-flight slot when the acquisition task ends, including by
/// panic or runtime shutdown.
struct ClearSlotOnExit(Weak<InFlightSlot>);

impl Drop for ClearSlotOnExit {
    fn drop(&mut self) {
        if let Some(slot) = self.0.upgrade() {
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        }
    }
}

impl Acquirer {
    async fn acquire(&self) -> AcquisitionOutcome {
        let response = self
            .http
            .get(&self.endpoint)
            .header(ACCEPT, "application/json")
            .header(REQUESTED_WITH_HEADER, REQUESTED_WITH_VALUE)
            .send()
            .await
            .map_err(|error| {
                warn!(url = %self.endpoint, error = %error, "failed to get CSRF cookie");
                TokenAcquisitionError::network(&self.endpoint, error)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.endpoint, status = status.as_u16(), "CSRF cookie endpoint refused");
            return Err(TokenAcquisitionError::http_status(
                &self.endpoint,
                status.as_u16(),
            ));
        }

        let token = self.wait_for_cookie().await.map(CsrfToken::from_cookie);
        if token.is_none() {
            debug!(cookie = %self.cookie_name, "CSRF endpoint answered but no cookie is present");
        }
        Ok(token)
    }

    async fn wait_for_cookie(&self) -> Option<String> {
        match self.settle {
            SettleStrategy::Immediate => self.cookies.read(&self.cookie_name),
            SettleStrategy::Fixed(delay) => {
                sleep(delay).await;
                self.cookies.read(&self.cookie_name)
            }
            SettleStrategy::Poll { interval, timeout } => {
                let interval = interval.max(MIN_POLL_INTERVAL);
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(value) = self.cookies.read(&self.cookie_name) {
                        return Some(value);
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    sleep(interval.min(deadline - now)).await;
                }
            }
        }
    }
}
