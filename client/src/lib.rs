//! authdash client library
//!
//! Client-side session lifecycle for the authdash REST API: login and
//! registration, persisted credentials, refresh-on-401, idle-timeout logout
//! and role-gated route guards.

pub mod config;
pub mod gateway;
pub mod navigation;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod token;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use gateway::{ApiRequest, Gateway, GatewayError};
pub use navigation::{Access, LogNavigator, Navigator, Route};
pub use protocol::{Role, User};
pub use session::{ActivityKind, AuthState, SessionError, SessionManager};
pub use storage::{Credentials, FileStorage, MemoryStorage, SessionStore, Storage};
