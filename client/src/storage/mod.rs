//! Persisted client state
//!
//! This module provides:
//! - `Storage` trait for string-keyed slots with all-or-nothing batch writes
//! - `MemoryStorage` for process-local state
//! - `FileStorage` for state that survives restarts
//! - `SessionStore`, the typed view over the credential and user slots

mod backend;
mod file;
mod memory;
mod store;
mod types;

pub use backend::{Storage, StorageOp};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SessionStore, USER_KEY};
pub use types::{Credentials, StoreError};
