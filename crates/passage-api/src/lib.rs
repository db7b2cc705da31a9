//! Backend API layer for Passage.
//!
//! Provides the [`AuthApi`] trait, covering the three calls the login flow
//! makes to the application's backend, and an HTTP implementation.
//!
//! # Feature Flags
//!
//! - `http` (default): [`HttpAuthApi`] via `reqwest`

mod error;
#[cfg(feature = "http")]
mod http;

pub use error::ApiError;
#[cfg(feature = "http")]
pub use http::{HttpAuthApi, API_KEY_HEADER, DEFAULT_TIMEOUT};

use std::future::Future;

use passage_protocol::{CallbackPayload, SessionId, UserAttributes};

/// Endpoint paths, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub callback: String,
    pub validate_session: String,
    pub user_data: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            callback: "/callback".into(),
            validate_session: "/validate_session".into(),
            user_data: "/user_data".into(),
        }
    }
}

/// The backend calls made during a login's lifetime.
///
/// A trait so the controller can be driven by a scripted double in tests,
/// and so a deployment can swap the transport without touching the state
/// machine.
///
/// # Example
///
/// ```rust
/// use passage_api::{ApiError, AuthApi};
/// use passage_protocol::{CallbackPayload, SessionId, UserAttributes};
///
/// /// Accepts every login and every session. Development only.
/// struct AcceptAll;
///
/// impl AuthApi for AcceptAll {
///     async fn submit_callback(
///         &self,
///         _payload: &CallbackPayload,
///     ) -> Result<UserAttributes, ApiError> {
///         Ok(UserAttributes::default())
///     }
///
///     async fn validate_session(&self, _session: &SessionId) -> Result<bool, ApiError> {
///         Ok(true)
///     }
///
///     async fn fetch_user(&self, _session: &SessionId) -> Result<UserAttributes, ApiError> {
///         Ok(UserAttributes::default())
///     }
/// }
/// ```
pub trait AuthApi: Send + Sync + 'static {
    /// Hands the provider's callback data to the backend and returns the
    /// user attributes it bound to the session.
    fn submit_callback(
        &self,
        payload: &CallbackPayload,
    ) -> impl Future<Output = Result<UserAttributes, ApiError>> + Send;

    /// Asks the backend whether `session` is still valid.
    ///
    /// `Ok(false)` is an explicit "invalid" from the server. Transport
    /// failures are errors, never `false`.
    fn validate_session(
        &self,
        session: &SessionId,
    ) -> impl Future<Output = Result<bool, ApiError>> + Send;

    /// Re-fetches the user attributes bound to `session`.
    fn fetch_user(
        &self,
        session: &SessionId,
    ) -> impl Future<Output = Result<UserAttributes, ApiError>> + Send;
}

/// Shared handles forward to the inner client.
impl<T: AuthApi> AuthApi for std::sync::Arc<T> {
    fn submit_callback(
        &self,
        payload: &CallbackPayload,
    ) -> impl Future<Output = Result<UserAttributes, ApiError>> + Send {
        (**self).submit_callback(payload)
    }

    fn validate_session(
        &self,
        session: &SessionId,
    ) -> impl Future<Output = Result<bool, ApiError>> + Send {
        (**self).validate_session(session)
    }

    fn fetch_user(
        &self,
        session: &SessionId,
    ) -> impl Future<Output = Result<UserAttributes, ApiError>> + Send {
        (**self).fetch_user(session)
    }
}
