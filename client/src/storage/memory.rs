//! In-process storage backend

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::backend::{Storage, StorageOp};
use super::types::StoreError;

/// Storage that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated storage
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn apply(&self, ops: &[StorageOp]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        apply_ops(&mut entries, ops);
        Ok(())
    }
}

pub(super) fn apply_ops(entries: &mut HashMap<String, String>, ops: &[StorageOp]) {
    for op in ops {
        match op {
            StorageOp::Set { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            StorageOp::Remove { key } => {
                entries.remove(key);
            }
        }
    }
}
