//! The session store: one session id and one user record, kept in step.
//!
//! The id and the record are two keys in a [`Storage`] backend, but they
//! are never written independently:
//!
//! - [`save`](SessionStore::save) sets a new id **and** drops any record
//!   bound to the previous one.
//! - [`save_user`](SessionStore::save_user) writes the record **and** the
//!   id it embeds, in one batch.
//! - [`clear`](SessionStore::clear) removes both in one batch.
//!
//! On the read side, [`load_user`](SessionStore::load_user) refuses a
//! record whose embedded id doesn't match the stored id, so a store that
//! was edited by hand (or by an older build) can't pair a user with the
//! wrong login.

use passage_protocol::{Codec, JsonCodec, SessionId, UserRecord};

use crate::{Storage, StorageError, StorageOp, StorageResult};

/// Key names for the two durable slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub session: String,
    pub user: String,
}

impl StorageKeys {
    /// Namespace used when none is configured.
    pub const DEFAULT_NAMESPACE: &'static str = "passage";

    /// Keys `<namespace>.session` and `<namespace>.user_data`.
    pub fn namespaced(namespace: &str) -> Self {
        Self {
            session: format!("{namespace}.session"),
            user: format!("{namespace}.user_data"),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::namespaced(Self::DEFAULT_NAMESPACE)
    }
}

/// Persists the current session id and its user record.
pub struct SessionStore {
    storage: Box<dyn Storage>,
    keys: StorageKeys,
    codec: JsonCodec,
}

impl SessionStore {
    /// Wraps a backend with the given key names.
    pub fn new(storage: Box<dyn Storage>, keys: StorageKeys) -> Self {
        Self {
            storage,
            keys,
            codec: JsonCodec,
        }
    }

    /// The key names this store writes to.
    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Persists a new session id for a login attempt.
    ///
    /// Any user record left over from a previous session is removed in the
    /// same batch, since it belongs to a different id.
    ///
    /// # Errors
    /// [`StorageError`] if the backend rejects the write. Nothing was
    /// stored in that case, and the caller must not proceed with `id`.
    pub fn save(&self, id: &SessionId) -> StorageResult<()> {
        self.storage.apply(&[
            StorageOp::Set(&self.keys.session, id.as_str()),
            StorageOp::Delete(&self.keys.user),
        ])?;
        tracing::debug!(session = %id, "session id persisted");
        Ok(())
    }

    /// Returns the persisted session id, if any.
    ///
    /// A missing id is the normal state before login, so this never fails:
    /// an unreadable store is logged and reported as absent.
    pub fn load(&self) -> Option<SessionId> {
        match self.storage.get(&self.keys.session) {
            Ok(Some(raw)) if !raw.is_empty() => Some(SessionId::new(raw)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read session id; treating as absent");
                None
            }
        }
    }

    /// Persists a user record together with the session id it embeds.
    ///
    /// # Errors
    /// [`StorageError::Encoding`] if the record can't be serialized, or any
    /// backend error. On error neither key was changed.
    pub fn save_user(&self, record: &UserRecord) -> StorageResult<()> {
        let bytes = self.codec.encode(record)?;
        let json = String::from_utf8(bytes)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        self.storage.apply(&[
            StorageOp::Set(&self.keys.session, record.session.as_str()),
            StorageOp::Set(&self.keys.user, &json),
        ])?;
        tracing::debug!(session = %record.session, "user record persisted");
        Ok(())
    }

    /// Returns the persisted user record, if there is one and it belongs
    /// to the persisted session id.
    ///
    /// Like [`load`](Self::load), this never fails: unreadable, corrupt, or
    /// mismatched data is logged and reported as absent.
    pub fn load_user(&self) -> Option<UserRecord> {
        let raw = match self.storage.get(&self.keys.user) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read user record; treating as absent");
                return None;
            }
        };

        let record: UserRecord = match self.codec.decode(raw.as_bytes()) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "stored user record is corrupt; ignoring it");
                return None;
            }
        };

        match self.load() {
            Some(id) if id == record.session => Some(record),
            stored => {
                tracing::warn!(
                    stored = ?stored.as_ref().map(SessionId::as_str),
                    "stored user record belongs to a different session; ignoring it"
                );
                None
            }
        }
    }

    /// Removes both the session id and the user record in one batch.
    ///
    /// # Errors
    /// [`StorageError`] from the backend. The batch is atomic, so on error
    /// both keys are still present (or both absent).
    pub fn clear(&self) -> StorageResult<()> {
        self.storage.apply(&[
            StorageOp::Delete(&self.keys.session),
            StorageOp::Delete(&self.keys.user),
        ])?;
        tracing::debug!("session store cleared");
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
