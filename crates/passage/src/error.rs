//! Unified error type for Passage.

use std::time::Duration;

use passage_api::ApiError;
use passage_protocol::{ProtocolError, SessionId};
use passage_session::StorageError;

/// Top-level error returned by every controller operation.
///
/// Sub-crate errors convert with `?`. Backend failures are split into the
/// categories the login flow reacts to differently: a transport failure
/// is [`Network`](Self::Network) or [`Timeout`](Self::Timeout), while a
/// reply the server actually sent is [`Api`](Self::Api).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Required configuration is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The durable session store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The backend did not answer within the deadline.
    #[error("auth api timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with an error status or an unreadable body.
    #[error("auth api error: {message}")]
    Api {
        /// HTTP status, when the server sent one.
        status: Option<u16>,
        message: String,
    },

    /// The callback's session id is not the one this client persisted.
    #[error("callback session {received} does not match the pending login")]
    SessionMismatch {
        expected: Option<SessionId>,
        received: SessionId,
    },

    /// A URL or message from the provider could not be understood.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The operation does not apply in the current auth state.
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// A callback submission is already in flight.
    #[error("a login callback is already being processed")]
    Busy,
}

/// Discriminant of [`AuthError`], carried by
/// [`AuthState::Error`](crate::AuthState::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Storage,
    Network,
    Timeout,
    Api,
    SessionMismatch,
    Protocol,
    InvalidState,
    Busy,
}

impl AuthError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Api { .. } => ErrorKind::Api,
            Self::SessionMismatch { .. } => ErrorKind::SessionMismatch,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Busy => ErrorKind::Busy,
        }
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Busy => true,
            Self::Api { status, .. } => {
                status.is_some_and(|s| s >= 500 || matches!(s, 408 | 429))
            }
            _ => false,
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(message) => Self::Network(message),
            ApiError::Timeout(after) => Self::Timeout(after),
            ApiError::Status { status, .. } => Self::Api {
                status: Some(status),
                message: err.to_string(),
            },
            ApiError::Malformed(message) => Self::Api {
                status: None,
                message: format!("malformed response: {message}"),
            },
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Api => "api",
            Self::SessionMismatch => "session mismatch",
            Self::Protocol => "protocol",
            Self::InvalidState => "invalid state",
            Self::Busy => "busy",
        };
        f.write_str(name)
    }
}
