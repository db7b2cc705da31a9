//! Error types for the session layer.

/// Errors that can occur while reading or writing durable storage.
///
/// Messages are kept as strings so the error is `Clone`, like every other
/// error in Passage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The backing store can't be reached at all (locked, disabled,
    /// poisoned, or missing permissions).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The write would exceed the store's capacity.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A stored value couldn't be encoded or decoded.
    #[error("storage encoding error: {0}")]
    Encoding(String),

    /// An I/O error from a file-backed store.
    #[error("storage io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull => Self::QuotaExceeded(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::Unavailable(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<passage_protocol::ProtocolError> for StorageError {
    fn from(err: passage_protocol::ProtocolError) -> Self {
        Self::Encoding(err.to_string())
    }
}
