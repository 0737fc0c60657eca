//! Authenticated identity record and session state.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The identity record returned by the login and identity endpoints.
///
/// Only `permissions` and `role` are interpreted; every other field is kept
/// verbatim and reachable through [`Identity::field`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Identity {
    /// Permission names granted to this identity.
    #[must_use]
    pub fn permissions(&self) -> &[String] {
        self.permissions.as_deref().unwrap_or_default()
    }

    /// Role name, if the record carries one.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Returns true when `permission` is granted.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions().iter().any(|granted| granted == permission)
    }

    /// Returns true when the role equals `role` exactly.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role() == Some(role)
    }

    /// Any other field of the record.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The `name` field, when it is a string.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.field("name").and_then(Value::as_str)
    }

    /// The `email` field, when it is a string.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.field("email").and_then(Value::as_str)
    }
}

/// Where the session stands.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// No identity.
    #[default]
    Anonymous,
    /// A login is in progress.
    Authenticating,
    /// Logged in.
    Authenticated(Identity),
}

impl SessionState {
    /// Returns true only in the `Authenticated` state.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The identity, when authenticated.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Anonymous | Self::Authenticating => None,
        }
    }
}

/// Login credentials.
#[derive(Clone, Serialize)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Login email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
