//! Access token inspection
//!
//! Claims are read without verifying the signature. The client never makes
//! trust decisions from them; the backend remains the authority.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::Role;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    Format,

    #[error("invalid base64url encoding")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid claims: {0}")]
    Json(#[from] serde_json::Error),
}

/// Claims carried by the backend's access tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (the account email)
    pub sub: String,
    pub role: Role,
    /// Expiry as a Unix timestamp
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Decode the payload segment of a compact JWT.
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
        _ => return Err(TokenError::Format),
    };

    // Some issuers keep the padding; the no-pad engine rejects it.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{header}.{payload}.signature")
}
