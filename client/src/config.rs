//! Client configuration
//!
//! Defaults may be baked in at build time (`API_URL`, `SESSION_TIMEOUT_MS`)
//! and are then overridden by the runtime environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_REFRESH_PATH: &str = "/refresh";
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_STORE_PATH: &str = ".authdash/session.json";

/// Main client configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Backend API configuration
    pub api: ApiConfig,
    /// Session lifecycle configuration
    pub session: SessionConfig,
    /// Persisted client state configuration
    pub storage: StorageConfig,
}

/// Backend API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL every request path is appended to
    pub base_url: String,
    /// Path of the token refresh endpoint
    pub refresh_path: String,
    /// Per-request timeout. `None` leaves the transport default in place.
    pub request_timeout: Option<Duration>,
}

/// Session-related configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity after which an authenticated session is ended
    pub idle_timeout: Duration,
}

/// Where session state is persisted between runs
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: option_env!("API_URL")
                .filter(|url| !url.is_empty())
                .unwrap_or(DEFAULT_API_URL)
                .to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            request_timeout: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: option_env!("SESSION_TIMEOUT_MS")
                .and_then(parse_millis)
                .unwrap_or(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

/// Parse a positive millisecond count; zero and garbage are rejected.
fn parse_millis(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => None,
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // API config
        if let Ok(url) = env::var("API_URL")
            && !url.is_empty()
        {
            config.api.base_url = url;
        }
        if let Ok(path) = env::var("API_REFRESH_PATH")
            && !path.is_empty()
        {
            config.api.refresh_path = path;
        }
        if let Ok(val) = env::var("API_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            config.api.request_timeout = Some(Duration::from_secs(secs));
        }

        // Session config
        if let Ok(val) = env::var("SESSION_TIMEOUT_MS")
            && let Some(timeout) = parse_millis(&val)
        {
            config.session.idle_timeout = timeout;
        }

        // Storage config
        if let Ok(path) = env::var("SESSION_STORE_PATH")
            && !path.is_empty()
        {
            config.storage.path = PathBuf::from(path);
        }

        config
    }
}
