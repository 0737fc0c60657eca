//! Route guard decisions.
//!
//! Decides whether navigation to a route may proceed, given the session and
//! the route's requirements. Only a protected route visited with the hint set
//! but no identity in memory costs a round trip (the identity check).

use tracing::debug;

use crate::session::{AuthSession, Route};

/// Requirements a route declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMeta {
    /// Route name.
    pub name: String,
    /// Only authenticated users may enter.
    pub requires_auth: bool,
    /// Only anonymous users may enter (e.g. the login page).
    pub requires_unauth: bool,
    /// Permission needed beyond being authenticated.
    pub permission: Option<String>,
}

impl RouteMeta {
    /// A route with no requirements.
    #[must_use]
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A route that requires authentication.
    #[must_use]
    pub fn protected(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_auth: true,
            ..Self::default()
        }
    }

    /// A route only anonymous users may enter.
    #[must_use]
    pub fn guest_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_unauth: true,
            ..Self::default()
        }
    }

    /// Adds a required permission.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Proceed.
    Allow,
    /// Go to `Route` instead.
    Redirect(Route),
}

/// Decides whether navigation to `route` may proceed.
pub async fn authorize(session: &AuthSession, route: &RouteMeta) -> GuardDecision {
    if route.requires_auth {
        if session.is_authenticated() {
            return permission_decision(session, route);
        }
        if !session.hint_set() {
            debug!(route = %route.name, "no session hint, redirecting to login");
            return GuardDecision::Redirect(Route::Login);
        }
        return match session.check_auth().await {
            Ok(Some(_)) => permission_decision(session, route),
            Ok(None) => GuardDecision::Redirect(Route::Login),
            Err(err) => {
                debug!(route = %route.name, error = %err, "identity check failed, redirecting to login");
                GuardDecision::Redirect(Route::Login)
            }
        };
    }

    if route.requires_unauth && session.is_authenticated() {
        return GuardDecision::Redirect(Route::Home);
    }
    GuardDecision::Allow
}

fn permission_decision(session: &AuthSession, route: &RouteMeta) -> GuardDecision {
    // The landing page never redirects on permissions, or a user lacking it
    // would loop.
    let exempt = route.name == Route::Home.name();
    match route.permission.as_deref() {
        Some(permission) if !exempt && !session.has_permission(permission) => {
            debug!(route = %route.name, permission, "permission missing, redirecting home");
            GuardDecision::Redirect(Route::Home)
        }
        _ => GuardDecision::Allow,
    }
}
