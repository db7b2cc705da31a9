//! The auth state machine's states.
//!
//! ```text
//!  Initializing ──► Unauthenticated ──pre_login──► Redirecting
//!        │                ▲                            │ callback
//!        │                │ invalid / logout           ▼
//!        └─────────► Authenticated ◄──valid── Validating
//!                         │                            │
//!                         └─────── validate ──────────►│ transport failure
//!                                                      ▼
//!                                                    Error
//! ```

use std::fmt;

use passage_protocol::{SessionId, UserRecord};
use url::Url;

use crate::ErrorKind;

/// Where the login flow currently stands.
///
/// The presentation layer renders from this and nothing else: whether to
/// show the login button, a spinner, the dashboard, or an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Startup check has not run yet.
    Initializing,

    /// No usable login.
    Unauthenticated,

    /// A session id was minted and persisted, and the browser was sent to
    /// the provider.
    Redirecting { session: SessionId, url: Url },

    /// A validated (or freshly bound) login.
    Authenticated(UserRecord),

    /// Waiting on the backend. `user` is `None` while a callback is being
    /// submitted and `Some` while an existing login is re-validated.
    Validating { user: Option<UserRecord> },

    /// The last operation failed.
    ///
    /// A failed re-validation keeps the user record so the application can
    /// keep rendering it and retry. A failed login has `user: None`.
    Error {
        kind: ErrorKind,
        message: String,
        user: Option<UserRecord>,
    },
}

impl AuthState {
    /// Short lowercase name, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Unauthenticated => "unauthenticated",
            Self::Redirecting { .. } => "redirecting",
            Self::Authenticated(_) => "authenticated",
            Self::Validating { .. } => "validating",
            Self::Error { .. } => "error",
        }
    }

    /// True while a login is in place, including while it is re-validated.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            Self::Authenticated(_) | Self::Validating { user: Some(_) }
        )
    }

    /// True while the controller is waiting on startup or the backend.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Initializing | Self::Validating { .. })
    }

    pub fn is_redirecting(&self) -> bool {
        matches!(self, Self::Redirecting { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The user record the state carries, if any.
    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Validating { user } | Self::Error { user, .. } => user.as_ref(),
            _ => None,
        }
    }

    /// The provider URL of a pending redirect.
    pub fn redirect_url(&self) -> Option<&Url> {
        match self {
            Self::Redirecting { url, .. } => Some(url),
            _ => None,
        }
    }

    /// The error message, in the error state.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error { kind, message, .. } => write!(f, "error ({kind}): {message}"),
            Self::Authenticated(user) => write!(f, "authenticated as {}", user.email),
            other => f.write_str(other.name()),
        }
    }
}
