use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::Credentials;

/// Account role as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(alias = "admin", alias = "ADMIN")]
    Admin,
    #[serde(alias = "user", alias = "USER")]
    User,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// User object envelope shared by login, registration and profile responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Role,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

/// `POST /login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /register` and `POST /admin/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// `POST /refresh`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh response. Servers that rotate refresh tokens also send a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Login/registration response.
///
/// Every field is optional on the wire so that an incomplete body surfaces
/// as a missing field rather than a decode failure. Older backends send the
/// access token as `token`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// A success response that lacks something the session needs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("response is missing `{0}`")]
pub struct MissingField(pub &'static str);

impl AuthResponse {
    /// Split the response into the credential pair and the user payload.
    pub fn into_session(self) -> Result<(Credentials, User), MissingField> {
        let access_token = non_empty(self.access_token)
            .or_else(|| non_empty(self.token))
            .ok_or(MissingField("access_token"))?;
        let refresh_token = non_empty(self.refresh_token).ok_or(MissingField("refresh_token"))?;
        let user = self.user.ok_or(MissingField("user"))?;

        Ok((
            Credentials {
                access_token,
                refresh_token,
            },
            user,
        ))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Error envelope used by the backend: `{"error": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `GET /admin/dashboard`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminDashboard {
    pub user_count: usize,
    pub users: Vec<User>,
}
