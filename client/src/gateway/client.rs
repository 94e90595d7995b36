//! Request pipeline: bearer injection, single replay, coalesced refresh

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::types::{ApiRequest, GatewayError};
use crate::config::ApiConfig;
use crate::navigation::{Navigator, Route};
use crate::protocol::{ErrorBody, RefreshRequest, RefreshResponse};
use crate::session::{AuthState, StateCell};
use crate::storage::{Credentials, SessionStore};

/// HTTP gateway to the backend
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
    refresh_path: String,
    store: SessionStore,
    state: StateCell,
    navigator: Arc<dyn Navigator>,
    /// Held for the duration of a refresh; queued callers re-check the store
    refresh_lock: Mutex<()>,
}

impl Gateway {
    pub fn new(
        api: &ApiConfig,
        store: SessionStore,
        state: StateCell,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = api.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            refresh_path: api.refresh_path.clone(),
            store,
            state,
            navigator,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and decode a JSON success body.
    ///
    /// A 401 on a refreshable request triggers at most one refresh and one
    /// replay. If the session cannot be renewed the stored credentials are
    /// cleared, the host is sent to the login view and
    /// `GatewayError::RefreshExhausted` is returned. If the session was
    /// replaced or ended while the request was in flight nothing is written
    /// and `GatewayError::Superseded` is returned.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, GatewayError> {
        let sent = self.snapshot()?;
        let response = self.execute(&request, sent.access_token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && request.refresh_on_401 {
            debug!(
                "{} {} answered 401, refreshing access token",
                request.method, request.path
            );
            let fresh = self.refresh_after_rejection(&sent).await?;
            let replay = self.execute(&request, Some(&fresh)).await?;
            return decode(replay).await;
        }

        decode(response).await
    }

    /// Exchange a refresh token for a new access token. Does not touch the
    /// store.
    pub async fn refresh_with(&self, refresh_token: &str) -> Result<RefreshResponse, GatewayError> {
        let request = ApiRequest::post(
            self.refresh_path.clone(),
            &RefreshRequest {
                refresh_token: refresh_token.to_string(),
            },
        )?
        .public();
        let response = self.execute(&request, None).await?;
        decode(response).await
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<Response, GatewayError> {
        let start = Instant::now();
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.http.request(request.method.clone(), &url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        histogram!("authdash_request_duration_seconds").record(start.elapsed());
        debug!(
            "{} {} -> {}",
            request.method,
            request.path,
            response.status()
        );
        Ok(response)
    }

    /// The session a request goes out under
    fn snapshot(&self) -> Result<Sent, GatewayError> {
        let slot = self.state.lock_slot();
        Ok(Sent {
            generation: slot.generation,
            access_token: self.store.access_token()?,
        })
    }

    /// Obtain an access token to replay a request that was rejected.
    async fn refresh_after_rejection(&self, sent: &Sent) -> Result<String, GatewayError> {
        let _guard = self.refresh_lock.lock().await;

        let refresh_token = match self.plan_refresh(sent)? {
            RefreshPlan::Replay(token) => {
                debug!("Access token already replaced, replaying with it");
                return Ok(token);
            }
            RefreshPlan::NoRefreshToken => {
                warn!("Received 401 with no refresh token stored");
                self.end_session(sent.generation, None)?;
                return Err(GatewayError::RefreshExhausted);
            }
            RefreshPlan::Refresh(refresh_token) => refresh_token,
        };

        match self.refresh_with(&refresh_token).await {
            Ok(refreshed) => {
                counter!("authdash_token_refreshes_total").increment(1);
                self.store_refreshed(sent.generation, &refresh_token, refreshed)
            }
            Err(e) => {
                counter!("authdash_refresh_failures_total").increment(1);
                warn!("Token refresh failed: {}", e);
                self.end_session(sent.generation, Some(&refresh_token))?;
                Err(GatewayError::RefreshExhausted)
            }
        }
    }

    fn plan_refresh(&self, sent: &Sent) -> Result<RefreshPlan, GatewayError> {
        let slot = self.state.lock_slot();
        if slot.generation != sent.generation {
            info!("Session changed while the request was in flight");
            return Err(GatewayError::Superseded);
        }

        // Another request may have refreshed while we queued.
        if let Some(current) = self.store.access_token()?
            && sent.access_token.as_deref() != Some(current.as_str())
        {
            return Ok(RefreshPlan::Replay(current));
        }

        Ok(match self.store.refresh_token()? {
            Some(refresh_token) => RefreshPlan::Refresh(refresh_token),
            None => RefreshPlan::NoRefreshToken,
        })
    }

    /// Persist a refresh result, but only into the session it was obtained
    /// for: same generation, and the stored refresh token is still the one
    /// that was sent.
    fn store_refreshed(
        &self,
        generation: u64,
        sent_refresh: &str,
        refreshed: RefreshResponse,
    ) -> Result<String, GatewayError> {
        let slot = self.state.lock_slot();
        if slot.generation != generation
            || self.store.refresh_token()?.as_deref() != Some(sent_refresh)
        {
            info!("Session changed during refresh, discarding refreshed token");
            return Err(GatewayError::Superseded);
        }

        match refreshed.refresh_token {
            Some(rotated) => self.store.save_credentials(&Credentials {
                access_token: refreshed.access_token.clone(),
                refresh_token: rotated,
            })?,
            None => self.store.save_access_token(&refreshed.access_token)?,
        }
        info!("Access token refreshed");
        Ok(refreshed.access_token)
    }

    /// Tear down the session after an unrecoverable refresh failure.
    ///
    /// `expected_refresh` is the refresh token that failed (`None` when
    /// there was none). If a logout or a new login landed meanwhile, that
    /// session is left alone and `Superseded` is returned.
    fn end_session(
        &self,
        generation: u64,
        expected_refresh: Option<&str>,
    ) -> Result<(), GatewayError> {
        {
            let mut slot = self.state.lock_slot();
            if slot.generation != generation
                || self.store.refresh_token()?.as_deref() != expected_refresh
            {
                info!("Credentials changed during refresh, keeping the newer session");
                return Err(GatewayError::Superseded);
            }

            slot.generation += 1;
            slot.watchdog = None;
            if let Err(e) = self.store.clear() {
                error!("Failed to clear stored credentials: {}", e);
            }
            self.state.set(AuthState::Anonymous);
        }

        self.navigator.navigate(Route::Login);
        Ok(())
    }
}

/// Credentials a request went out with
struct Sent {
    generation: u64,
    access_token: Option<String>,
}

enum RefreshPlan {
    /// The token was already replaced; replay with the new one
    Replay(String),
    Refresh(String),
    NoRefreshToken,
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        return serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(e.to_string()));
    }

    let message = error_message(status, &body);
    if status == StatusCode::UNAUTHORIZED {
        Err(GatewayError::Unauthorized { message })
    } else {
        Err(GatewayError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Prefer the backend's `{"error": ...}` envelope, then the raw body, then
/// the status reason.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ErrorBody>(body) {
        return envelope.error;
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if !text.is_empty() {
        return text;
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::LogNavigator;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_error_message_prefers_envelope() {
        assert_eq!(
            error_message(
                StatusCode::UNAUTHORIZED,
                br#"{"error":"Invalid credentials"}"#
            ),
            "Invalid credentials"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, b"  plain text  "),
            "plain text"
        );
        assert_eq!(error_message(StatusCode::FORBIDDEN, b""), "Forbidden");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = ApiConfig {
            base_url: "http://api.local:3000/".to_string(),
            ..ApiConfig::default()
        };
        let gateway = Gateway::new(
            &api,
            SessionStore::new(Arc::new(MemoryStorage::new())),
            StateCell::new(),
            Arc::new(LogNavigator),
        )
        .unwrap();
        assert_eq!(gateway.base_url(), "http://api.local:3000");
    }

    #[test]
    fn test_public_requests_do_not_refresh() {
        let request = ApiRequest::get("/login").public();
        assert!(!request.refresh_on_401);
        assert!(ApiRequest::get("/user/profile").refresh_on_401);
    }
}
