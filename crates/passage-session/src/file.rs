//! File-backed durable storage.
//!
//! All keys live in one JSON object file:
//!
//! ```json
//! { "passage.session": "1718000000000_Q3xv...", "passage.user_data": "{...}" }
//! ```
//!
//! Every batch is a read-modify-write of the whole file: read the current
//! object, apply the ops, write the result to a sibling temp file, flush it
//! to disk, then `rename` it over the original. A rename within one
//! directory replaces the file in a single step, so a reader (in this
//! process or another) sees either the old object or the new one, never a
//! half-written file and never half a batch.
//!
//! Temp files are named per writer (`.{file}.{pid}.{seq}.{nanos}.tmp`), so
//! two stores on the same path never write into each other's temp file.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::storage::apply_ops;
use crate::{Storage, StorageError, StorageOp, StorageResult};

/// Durable storage in a single JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles inside this process. Other
    /// processes writing the same file get last-writer-wins.
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens (or prepares to create) the store at `path`.
    ///
    /// Creates missing parent directories. The file itself is created on
    /// the first write.
    ///
    /// # Errors
    /// [`StorageError`] if the parent directory can't be created, or if an
    /// existing file at `path` isn't a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let storage = Self {
            path,
            write_lock: Mutex::new(()),
        };
        // Fail fast on a corrupt file rather than on the first login.
        storage.read_map()?;

        tracing::debug!(path = %storage.path.display(), "file storage opened");
        Ok(storage)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> StorageResult<HashMap<String, String>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::Encoding(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let tmp = self.temp_path();
        if let Err(e) = write_synced(&tmp, &bytes).and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        // Persist the rename itself. Not every platform can open a directory.
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    /// A temp path next to the store, unique to this write.
    fn temp_path(&self) -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "passage".into());
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        self.path.with_file_name(format!(
            ".{file_name}.{}.{seq}.{nanos}.tmp",
            std::process::id()
        ))
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn apply(&self, batch: &[StorageOp<'_>]) -> StorageResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Unavailable("file store lock poisoned".into()))?;

        let mut map = self.read_map()?;
        apply_ops(&mut map, batch);
        self.write_map(&map)
    }
}
