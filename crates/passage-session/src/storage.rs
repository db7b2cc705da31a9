//! Durable key-value storage backends.
//!
//! Passage stores two string values (the session id and the serialized
//! user record) under application-namespaced keys. [`Storage`] is the
//! minimal interface a backend needs: read one key, and apply a batch of
//! writes as a unit.
//!
//! The batch is the important part. Clearing a session removes two keys,
//! and nobody may ever observe one removed and the other still there.
//! Backends make [`Storage::apply`] atomic with respect to every other call
//! on the same backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::StorageError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// One write inside a [`Storage::apply`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp<'a> {
    /// Store `value` under `key`, replacing any previous value.
    Set(&'a str, &'a str),
    /// Remove `key`. Removing a missing key is not an error.
    Delete(&'a str),
}

/// A durable string-valued key-value store.
pub trait Storage: Send + Sync {
    /// Reads a value. `Ok(None)` means the key isn't set.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Applies every operation in `batch`, in order, as one atomic unit:
    /// either all of them land or none do, and no concurrent reader sees
    /// a partial batch.
    fn apply(&self, batch: &[StorageOp<'_>]) -> StorageResult<()>;

    /// Stores a single value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.apply(&[StorageOp::Set(key, value)])
    }

    /// Removes a single key.
    fn delete(&self, key: &str) -> StorageResult<()> {
        self.apply(&[StorageOp::Delete(key)])
    }
}

/// Shared handles forward to the backend, so callers can keep an
/// `Arc<MemoryStorage>` around to inspect what the store wrote.
impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn apply(&self, batch: &[StorageOp<'_>]) -> StorageResult<()> {
        (**self).apply(batch)
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// In-process storage. Lost when the process exits.
///
/// Optionally enforces a byte quota (sum of key and value lengths), so the
/// quota-exceeded path can be exercised without filling a disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Creates an empty, unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that rejects batches that would push its
    /// total size past `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        Ok(data.get(key).cloned())
    }

    fn apply(&self, batch: &[StorageOp<'_>]) -> StorageResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;

        // Stage on a copy so a quota failure leaves the store untouched.
        let mut staged = data.clone();
        apply_ops(&mut staged, batch);

        if let Some(quota) = self.quota {
            let used: usize = staged.iter().map(|(k, v)| k.len() + v.len()).sum();
            if used > quota {
                return Err(StorageError::QuotaExceeded(format!(
                    "{used} bytes exceeds quota of {quota}"
                )));
            }
        }

        *data = staged;
        Ok(())
    }
}

/// Applies a batch to an in-memory map. Shared with [`FileStorage`](crate::FileStorage).
pub(crate) fn apply_ops(map: &mut HashMap<String, String>, batch: &[StorageOp<'_>]) {
    for op in batch {
        match *op {
            StorageOp::Set(key, value) => {
                map.insert(key.to_string(), value.to_string());
            }
            StorageOp::Delete(key) => {
                map.remove(key);
            }
        }
    }
}
