//! Storage trait definition

use super::types::StoreError;

/// One mutation inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Set { key: String, value: String },
    Remove { key: String },
}

impl StorageOp {
    pub fn set(key: &str, value: impl Into<String>) -> Self {
        StorageOp::Set {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn remove(key: &str) -> Self {
        StorageOp::Remove {
            key: key.to_string(),
        }
    }
}

/// String-keyed durable slots (the shape of browser local storage).
///
/// `apply` must be all-or-nothing: a concurrent reader observes either none
/// or all of a batch.
pub trait Storage: Send + Sync {
    /// Read one slot
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Apply a batch of mutations atomically
    fn apply(&self, ops: &[StorageOp]) -> Result<(), StoreError>;
}
