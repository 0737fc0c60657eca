//! Session lifecycle: login, logout, identity check and cold start.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, instrument, warn};

use super::hint::HintStore;
use super::identity::{Credentials, Identity, SessionState};
use super::notice::Notice;
use super::{Navigator, Route};
use crate::transport::{ApiClient, ApiError};

const LOGIN_SUCCESS_MESSAGE: &str = "Login successful";

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The logged-in identity.
    pub identity: Identity,
    /// Success notice for the user.
    pub notice: Notice,
}

/// Owns the authenticated identity and keeps the durable hint in step with
/// it.
///
/// The identity exists only in memory; across restarts only the hint
/// survives, and [`AuthSession::initialize_auth`] re-establishes the
/// identity from the server.
pub struct AuthSession {
    client: ApiClient,
    hint: Arc<dyn HintStore>,
    navigator: Arc<dyn Navigator>,
    state: RwLock<SessionState>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("client", &self.client)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Creates an anonymous session.
    #[must_use]
    pub fn new(client: ApiClient, hint: Arc<dyn HintStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            client,
            hint,
            navigator,
            state: RwLock::new(SessionState::Anonymous),
        }
    }

    /// The client this session authenticates.
    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true while an identity is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_authenticated()
    }

    /// The current identity, if authenticated.
    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identity()
            .cloned()
    }

    /// Returns true when authenticated and `permission` is granted.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identity()
            .is_some_and(|identity| identity.has_permission(permission))
    }

    /// Returns true when authenticated with exactly `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identity()
            .is_some_and(|identity| identity.has_role(role))
    }

    /// Whether the durable hint says a previous run was authenticated.
    #[must_use]
    pub fn hint_set(&self) -> bool {
        self.hint.was_authenticated()
    }

    /// Logs in with `credentials`.
    ///
    /// Requests a token first, posts the credentials, stores the returned
    /// identity and sets the hint, then requests a token once more because
    /// the server rotates the session on login. A failure of that last
    /// refresh is logged and does not fail the login.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`]; the session is anonymous
    /// afterwards.
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ApiError> {
        self.set_state(SessionState::Authenticating);

        let (identity, message) = match self.submit_login(credentials).await {
            Ok(accepted) => accepted,
            Err(err) => {
                self.set_state(SessionState::Anonymous);
                if err.is_expected() {
                    debug!(error = %err, "login rejected");
                } else {
                    warn!(error = %err, "login failed");
                }
                return Err(err);
            }
        };

        self.set_state(SessionState::Authenticated(identity.clone()));
        self.set_hint();
        info!("logged in");

        if let Err(err) = self.client.broker().ensure_fresh_token().await {
            warn!(error = %err, "token refresh after login failed");
        }

        Ok(LoginOutcome {
            identity,
            notice: Notice::success(message.unwrap_or_else(|| LOGIN_SUCCESS_MESSAGE.to_string())),
        })
    }

    async fn submit_login(
        &self,
        credentials: &Credentials,
    ) -> Result<(Identity, Option<String>), ApiError> {
        self.client.broker().ensure_fresh_token().await?;
        let response = self
            .client
            .post_json(self.client.config().login_path(), credentials)
            .await?;
        let identity = response.data::<Identity>()?;
        Ok((identity, response.message()))
    }

    /// Logs out.
    ///
    /// The local identity and the hint are cleared and the navigator is sent
    /// to the login route whatever the server answered.
    ///
    /// # Errors
    ///
    /// Returns the logout request's error, after local state is cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .client
            .post_empty(self.client.config().logout_path())
            .await;
        if let Err(err) = &result {
            warn!(error = %err, "logout request failed, clearing local session anyway");
        }

        self.set_state(SessionState::Anonymous);
        self.clear_hint();
        self.navigator.navigate(Route::Login);
        info!("logged out");
        result.map(|_| ())
    }

    /// Asks the server who is logged in.
    ///
    /// Returns `Ok(None)` when the server reports no session; that case is
    /// not an error and is not logged above debug.
    ///
    /// # Errors
    ///
    /// Any other failure clears the session and hint and is returned.
    #[instrument(skip(self))]
    pub async fn check_auth(&self) -> Result<Option<Identity>, ApiError> {
        let fetched = match self
            .client
            .get(self.client.config().identity_path())
            .await
        {
            Ok(response) => response.data::<Identity>(),
            Err(err) => Err(err),
        };

        match fetched {
            Ok(identity) => {
                self.set_state(SessionState::Authenticated(identity.clone()));
                self.set_hint();
                Ok(Some(identity))
            }
            Err(ApiError::SessionExpired { .. }) => {
                debug!("no active session");
                self.set_state(SessionState::Anonymous);
                self.clear_hint();
                Ok(None)
            }
            Err(err) => {
                self.set_state(SessionState::Anonymous);
                self.clear_hint();
                Err(err)
            }
        }
    }

    /// Restores the session on startup.
    ///
    /// Without the hint nothing is sent. With it, a token is requested and
    /// the identity checked; any failure leaves the session anonymous and the
    /// hint cleared.
    #[instrument(skip(self))]
    pub async fn initialize_auth(&self) -> Option<Identity> {
        if !self.hint.was_authenticated() {
            debug!("no session hint, starting anonymous");
            self.set_state(SessionState::Anonymous);
            return None;
        }

        match self.restore().await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(error = %err, "could not restore session");
                self.set_state(SessionState::Anonymous);
                self.clear_hint();
                None
            }
        }
    }

    async fn restore(&self) -> Result<Option<Identity>, ApiError> {
        self.client.broker().ensure_fresh_token().await?;
        self.check_auth().await
    }

    fn set_state(&self, next: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn set_hint(&self) {
        if let Err(err) = self.hint.set() {
            warn!(error = %err, "failed to persist session hint");
        }
    }

    fn clear_hint(&self) {
        if let Err(err) = self.hint.clear() {
            warn!(error = %err, "failed to clear session hint");
        }
    }
}
