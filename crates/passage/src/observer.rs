//! Hooks the controller calls on its way through the state machine.
//!
//! [`AuthObserver`] sees every transition and every error; it is where an
//! application attaches analytics or an error reporter. [`Navigator`]
//! performs the actual browser redirect to the provider. Both default to
//! implementations that only log.

use url::Url;

use crate::{AuthError, AuthState};

/// Receives state transitions and errors.
///
/// Called synchronously from the controller, after the new state is
/// published. Implementations must not block.
pub trait AuthObserver: Send + Sync + 'static {
    /// Called after every state change.
    fn on_transition(&self, _from: &AuthState, _to: &AuthState) {}

    /// Called for every error an operation returns, before it is returned.
    fn on_error(&self, _error: &AuthError) {}
}

/// Logs transitions at `info` and errors at `warn`.
///
/// User records are never logged, only the state names.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AuthObserver for TracingObserver {
    fn on_transition(&self, from: &AuthState, to: &AuthState) {
        tracing::info!(from = from.name(), to = to.name(), "auth state changed");
    }

    fn on_error(&self, error: &AuthError) {
        tracing::warn!(kind = %error.kind(), error = %error, "auth operation failed");
    }
}

/// Sends the user agent to the identity provider.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, url: &Url);
}

/// A navigator for hosts that redirect on their own: it only logs the
/// target. The URL is also available from
/// [`AuthState::redirect_url`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, url: &Url) {
        tracing::info!(host = url.host_str().unwrap_or_default(), "redirecting to identity provider");
    }
}
