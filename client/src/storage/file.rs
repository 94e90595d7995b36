//! File-backed storage
//!
//! The whole slot map is kept in memory and rewritten on every batch: the
//! new contents go to a temporary file in the same directory which is then
//! renamed over the old one, so the file on disk always holds a complete
//! batch.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::backend::{Storage, StorageOp};
use super::memory::apply_ops;
use super::types::StoreError;

/// Storage persisted as a JSON object on disk
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable or corrupt file is treated as empty; the next write
    /// replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                Ok(entries) => {
                    debug!("Loaded {} session slots from {:?}", entries.len(), path);
                    entries
                }
                Err(e) => {
                    warn!("Ignoring corrupt session store {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, entries)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Persist {
            path: self.path.display().to_string(),
            message: e.error.to_string(),
        })?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn apply(&self, ops: &[StorageOp]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = entries.clone();
        apply_ops(&mut next, ops);
        self.persist(&next)?;

        *entries = next;
        Ok(())
    }
}
