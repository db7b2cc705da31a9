//! Decoding the backend's session-validation reply.
//!
//! The backend's reply shape isn't pinned down, so this module is the one
//! place that knows how to read it. Accepted shapes:
//!
//! - a bare JSON boolean: `true`
//! - an object with a boolean under one of [`VALIDITY_KEYS`]:
//!   `{"valid": false}`, `{"is_valid": true, "user": {...}}`
//!
//! Anything else is rejected. A reply that doesn't clearly say "valid" or
//! "invalid" must never be read as either.

use serde_json::Value;

use crate::ProtocolError;

/// Object keys that carry the validity flag, checked in order.
pub const VALIDITY_KEYS: &[&str] = &["valid", "is_valid", "valid_session", "success"];

/// Extracts the validity flag from a validation reply.
///
/// # Errors
/// [`ProtocolError::InvalidMessage`] if no boolean validity indicator is
/// present. A key holding a non-boolean (`"valid": "yes"`) also counts as
/// missing.
pub fn decode_validity(reply: &Value) -> Result<bool, ProtocolError> {
    if let Value::Bool(valid) = reply {
        return Ok(*valid);
    }

    if let Value::Object(fields) = reply {
        for key in VALIDITY_KEYS {
            if let Some(Value::Bool(valid)) = fields.get(*key) {
                return Ok(*valid);
            }
        }
    }

    Err(ProtocolError::InvalidMessage(
        "validation reply has no validity indicator".into(),
    ))
}
