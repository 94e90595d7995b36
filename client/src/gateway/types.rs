//! Gateway request and error types

use reqwest::Method;
use serde::Serialize;
use thiserror::Error;

use crate::storage::StoreError;

/// Errors surfaced by the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// The session could not be renewed and has been torn down
    #[error("Session expired: token refresh failed")]
    RefreshExhausted,

    /// The session was ended or replaced while the request was in flight
    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// A request to the backend, relative to the configured base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(super) method: Method,
    pub(super) path: String,
    pub(super) body: Option<serde_json::Value>,
    pub(super) refresh_on_401: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            refresh_on_401: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self, GatewayError> {
        Self::new(Method::POST, path).with_json(body)
    }

    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self, GatewayError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Treat a 401 as final instead of refreshing. Used by the endpoints
    /// that establish credentials in the first place.
    pub fn public(mut self) -> Self {
        self.refresh_on_401 = false;
        self
    }
}
