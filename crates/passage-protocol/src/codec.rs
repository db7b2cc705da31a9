//! Codec trait and implementations for serializing records.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The session store doesn't care HOW a [`UserRecord`](crate::UserRecord)
//! is serialized; it just needs something that implements [`Codec`].
//! Today that is [`JsonCodec`], which keeps the stored value readable in
//! any storage inspector.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds
///
/// - `Send + Sync` → safe to share between threads, since the store lives
///   inside a controller that Tokio may poll from any worker.
/// - `'static` → the codec owns everything it needs.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use passage_protocol::{Codec, JsonCodec, SessionId, UserRecord};
///
/// let codec = JsonCodec;
///
/// let record = UserRecord {
///     name: "Ana".into(),
///     email: "ana@example.com".into(),
///     phone: None,
///     profile_img: None,
///     session: SessionId::new("1700000000000_abc"),
/// };
///
/// let bytes = codec.encode(&record).unwrap();
/// let decoded: UserRecord = codec.decode(&bytes).unwrap();
/// assert_eq!(record, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
