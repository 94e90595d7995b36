//! Test Utilities Module
//!
//! Fixtures shared by the unit tests. Only compiled for tests.

#![cfg(test)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::navigation::{Navigator, Route};
use crate::protocol::{Role, User};
use crate::session::SessionManager;
use crate::storage::{ACCESS_TOKEN_KEY, MemoryStorage, REFRESH_TOKEN_KEY, USER_KEY};

pub const TEST_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Nothing listens on the discard port, so any request fails fast.
pub const UNREACHABLE_API: &str = "http://127.0.0.1:9";

// ============================================================================
// Navigator
// ============================================================================

/// Navigator that remembers every route it was sent to
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn test_user(role: Role) -> User {
    User {
        id: 1,
        email: "a@b.com".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        role,
    }
}

/// Storage holding a credential pair and, optionally, a cached user
pub fn seeded_storage(access: &str, refresh: &str, user: Option<&User>) -> Arc<MemoryStorage> {
    let mut entries = vec![
        (ACCESS_TOKEN_KEY.to_string(), access.to_string()),
        (REFRESH_TOKEN_KEY.to_string(), refresh.to_string()),
    ];
    if let Some(user) = user {
        entries.push((USER_KEY.to_string(), serde_json::to_string(user).unwrap()));
    }
    Arc::new(MemoryStorage::with_entries(entries))
}

pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.api.base_url = base_url.to_string();
    config.session.idle_timeout = TEST_IDLE_TIMEOUT;
    config
}

// ============================================================================
// Test Context
// ============================================================================

/// A session manager wired to recording collaborators
pub struct TestContext {
    pub manager: SessionManager,
    pub navigator: Arc<RecordingNavigator>,
}

impl TestContext {
    /// Manager whose backend is unreachable
    pub fn new(storage: impl Into<Arc<MemoryStorage>>) -> Self {
        Self::with_api(storage, UNREACHABLE_API)
    }

    pub fn with_api(storage: impl Into<Arc<MemoryStorage>>, base_url: &str) -> Self {
        let storage: Arc<MemoryStorage> = storage.into();
        let navigator = Arc::new(RecordingNavigator::default());
        let manager = SessionManager::new(&test_config(base_url), storage, navigator.clone())
        .expect("Failed to build session manager");
        Self { manager, navigator }
    }
}
