//! Core types shared by storage, the backend API, and the controller.
//!
//! These are the structures that get serialized to JSON, either as a
//! request body for the backend, or as the value stored in the durable
//! user-data slot.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// An opaque identifier for one login attempt.
///
/// A newtype around `String` so a session id can't be confused with an
/// app token or an email address in a function signature, even though all
/// three are strings underneath.
///
/// `#[serde(transparent)]` serializes this as the bare string, so the
/// backend sees `"session": "1718000000000_a8Kd..."` and not
/// `"session": { "0": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrows the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the underlying `String`.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns `true` for the empty identifier, which is never valid.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// The attributes bound to a session after a successful callback.
///
/// `session` is the identifier this record belongs to. The store uses it to
/// check that the persisted id and the persisted record still describe the
/// same login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// URL of the profile picture.
    #[serde(default)]
    pub profile_img: Option<String>,
    pub session: SessionId,
}

impl UserRecord {
    /// Replaces every attribute present in `attrs`, keeping the current
    /// value for anything the backend left out.
    ///
    /// The `session` field is never touched here. Rebinding a record to a
    /// different session is a mismatch, and the controller rejects it
    /// before merging.
    pub fn merge(&mut self, attrs: UserAttributes) {
        if let Some(name) = attrs.name {
            self.name = name;
        }
        if let Some(email) = attrs.email {
            self.email = email;
        }
        if attrs.phone.is_some() {
            self.phone = attrs.phone;
        }
        if attrs.profile_img.is_some() {
            self.profile_img = attrs.profile_img;
        }
    }
}

// ---------------------------------------------------------------------------
// UserAttributes
// ---------------------------------------------------------------------------

/// User attributes as returned by the backend.
///
/// Every field is optional: the callback and refresh endpoints may echo
/// back a full profile or only what changed. [`UserRecord::merge`] folds
/// these into an existing record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_img: Option<String>,
    /// Echo of the session the backend bound these attributes to.
    #[serde(default)]
    pub session: Option<SessionId>,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of the callback submission.
///
/// Field names are the backend's contract and must not be renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub session: SessionId,
    pub token_app: String,
    pub secret_key: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub profile_img: Option<String>,
}

/// Body of requests that only carry the session: validation and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session: SessionId,
}
