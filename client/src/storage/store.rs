//! Typed access to the session slots

use std::sync::Arc;

use tracing::warn;

use super::backend::{Storage, StorageOp};
use super::types::{Credentials, StoreError};
use crate::protocol::User;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// Credential pair and cached user on top of a `Storage` backend.
///
/// Writes that touch more than one slot go through a single batch, so a
/// reader never sees an access token from one session next to a refresh
/// token from another.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn Storage>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Storage>) -> Self {
        Self { backend }
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.slot(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.slot(REFRESH_TOKEN_KEY)
    }

    /// Empty slots count as absent
    fn slot(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.backend.get(key)?.filter(|value| !value.is_empty()))
    }

    /// The stored pair, if both halves are present
    pub fn credentials(&self) -> Result<Option<Credentials>, StoreError> {
        let access_token = self.access_token()?;
        let refresh_token = self.refresh_token()?;
        Ok(match (access_token, refresh_token) {
            (Some(access_token), Some(refresh_token)) => Some(Credentials {
                access_token,
                refresh_token,
            }),
            _ => None,
        })
    }

    /// The cached user. A slot that no longer parses is reported as absent.
    pub fn cached_user(&self) -> Result<Option<User>, StoreError> {
        let Some(raw) = self.backend.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!("Ignoring unreadable cached user: {}", e);
                Ok(None)
            }
        }
    }

    /// Persist a fresh session: tokens first, then the user, in one batch.
    pub fn save_session(&self, credentials: &Credentials, user: &User) -> Result<(), StoreError> {
        let user = serde_json::to_string(user)?;
        self.backend.apply(&[
            StorageOp::set(ACCESS_TOKEN_KEY, credentials.access_token.as_str()),
            StorageOp::set(REFRESH_TOKEN_KEY, credentials.refresh_token.as_str()),
            StorageOp::set(USER_KEY, user),
        ])
    }

    pub fn save_credentials(&self, credentials: &Credentials) -> Result<(), StoreError> {
        self.backend.apply(&[
            StorageOp::set(ACCESS_TOKEN_KEY, credentials.access_token.as_str()),
            StorageOp::set(REFRESH_TOKEN_KEY, credentials.refresh_token.as_str()),
        ])
    }

    pub fn save_access_token(&self, access_token: &str) -> Result<(), StoreError> {
        self.backend.apply(&[StorageOp::set(ACCESS_TOKEN_KEY, access_token)])
    }

    pub fn cache_user(&self, user: &User) -> Result<(), StoreError> {
        let user = serde_json::to_string(user)?;
        self.backend.apply(&[StorageOp::set(USER_KEY, user)])
    }

    /// Remove the pair and the cached user together
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.apply(&[
            StorageOp::remove(ACCESS_TOKEN_KEY),
            StorageOp::remove(REFRESH_TOKEN_KEY),
            StorageOp::remove(USER_KEY),
        ])
    }
}
