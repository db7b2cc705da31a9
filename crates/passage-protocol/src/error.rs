//! Error types for the protocol layer.
//!
//! Each crate in Passage defines its own error enum. When you see a
//! `ProtocolError`, the problem is in the shape of a message or a URL,
//! not in storage or networking.

/// Errors that can occur in the protocol layer.
///
/// Variants carry rendered messages instead of the original
/// `serde_json`/`url` errors so the type stays `Clone`: the controller
/// hands the same outcome to every caller waiting on one validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(String),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated records.
    #[error("decode failed: {0}")]
    Decode(String),

    /// A URL was not a syntactically valid absolute URL, or it cannot
    /// carry a query string (e.g. `mailto:`).
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The message parsed but violates the protocol: a return URL
    /// without a `session`, a provider `error` parameter, or a
    /// validation reply with no validity indicator.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
