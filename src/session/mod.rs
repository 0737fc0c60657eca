//! Authentication session lifecycle.
//!
//! [`AuthSession`] is the single owner of the logged-in identity. It drives
//! the login, logout, identity-check and cold-start flows over an
//! [`crate::ApiClient`] and keeps a durable [`HintStore`] flag in step so the
//! next start knows whether restoring a session is worth a round trip.

mod hint;
mod identity;
mod lifecycle;
mod notice;

pub use hint::{FileHintStore, HintError, HintStore, MemoryHintStore, default_hint_path};
pub use identity::{Credentials, Identity, SessionState};
pub use lifecycle::{AuthSession, LoginOutcome};
pub use notice::{ERROR_TTL, Notice, NoticeKind, SUCCESS_TTL};

/// Navigation targets the session can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The unauthenticated entry point.
    Login,
    /// The default authenticated landing page.
    Home,
}

impl Route {
    /// Route name as used by the host application's router.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Home => "dashboard",
        }
    }
}

/// Receives navigation requests (for example after logout).
pub trait Navigator: Send + Sync {
    /// Navigates to `route`.
    fn navigate(&self, route: Route);
}

/// Navigator that ignores every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _route: Route) {}
}
