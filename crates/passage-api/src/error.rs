use std::time::Duration;

/// Errors that can occur when calling the backend.
///
/// The split matters to callers: [`Timeout`](Self::Timeout) means the
/// server never answered in time, [`Network`](Self::Network) means we
/// never reached it, and [`Status`](Self::Status) means it answered and
/// said no.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Connection-level failure: DNS, refused, reset, TLS.
    #[error("network error: {0}")]
    Network(String),

    /// The client-side deadline elapsed before a full response arrived.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The server answered 2xx, but the body wasn't what the contract
    /// promises (not JSON, wrong shape, no validity indicator).
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// HTTP status, for [`Status`](Self::Status) errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` for a 4xx answer: the server understood the request and
    /// refused it.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    /// `true` when the status says the session itself is no good:
    /// unauthorized, forbidden, unknown or gone.
    ///
    /// Other 4xx answers (a 408 or 429 in particular) say nothing about
    /// the session and must not end it.
    pub fn is_session_rejection(&self) -> bool {
        matches!(self.status(), Some(401 | 403 | 404 | 410))
    }

    /// `true` for failures a user retry might fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            Self::Malformed(_) => false,
        }
    }
}
