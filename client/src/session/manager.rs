use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::idle::IdleWatchdog;
use super::state::{ActivityKind, AuthState, SessionSlot, StateCell};
use crate::config::Config;
use crate::gateway::{Gateway, GatewayError};
use crate::navigation::{Access, Navigator, Route};
use crate::protocol::{AuthResponse, LoginRequest, RegisterRequest, Role, User};
use crate::storage::{Credentials, SessionStore, Storage, StoreError};
use crate::token::{Claims, decode_claims};

/// Session manager errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{message}")]
    AuthRejected { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Session expired, please log in again")]
    RefreshExhausted,

    /// A logout or another login landed while the request was in flight;
    /// its result was discarded.
    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport(e) => SessionError::Transport(e),
            GatewayError::Unauthorized { message } => SessionError::AuthRejected { message },
            GatewayError::Status { status, message } => SessionError::Http { status, message },
            GatewayError::Decode(message) => SessionError::MalformedResponse(message),
            GatewayError::Encode(e) => SessionError::InvalidRequest(e.to_string()),
            GatewayError::RefreshExhausted => SessionError::RefreshExhausted,
            GatewayError::Superseded => SessionError::Superseded,
            GatewayError::Storage(e) => SessionError::Storage(e),
        }
    }
}

/// What a commit writes to the store besides publishing the user
enum Persist<'a> {
    Nothing,
    CachedUser,
    Session(&'a Credentials),
}

/// Owns the authenticated-user state, the stored credential pair, the idle
/// watchdog and the gateway. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    idle_timeout: Duration,
    store: SessionStore,
    /// Published state plus the commit slot shared with the gateway
    state: StateCell,
    gateway: Gateway,
    navigator: Arc<dyn Navigator>,
    in_flight: AtomicUsize,
    initialized: AtomicBool,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, SessionError> {
        let store = SessionStore::new(storage);
        let state = StateCell::new();
        let gateway = Gateway::new(&config.api, store.clone(), state.clone(), navigator.clone())?;

        Ok(Self {
            inner: Arc::new(Inner {
                idle_timeout: config.session.idle_timeout,
                store,
                state,
                gateway,
                navigator,
                in_flight: AtomicUsize::new(0),
                initialized: AtomicBool::new(false),
            }),
        })
    }

    /// Restore the session persisted by a previous run.
    ///
    /// Runs once. Any failure clears persisted state and resolves to
    /// `Anonymous`; nothing is returned as an error. A logout or login that
    /// lands while hydration is in flight wins over the restored session.
    pub async fn initialize(&self) -> AuthState {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            debug!("Session already initialized");
            return self.state();
        }

        let generation = {
            let slot = self.inner.lock_slot();
            if self.inner.state.get() != AuthState::Uninitialized {
                debug!("Session resolved before initialization");
                return self.state();
            }
            self.inner.state.set(AuthState::Hydrating);
            slot.generation
        };

        match self.hydrate().await {
            Ok(Some((user, persist))) => {
                let user_id = user.id;
                match self.inner.commit_session(persist, user, Some(generation)) {
                    Ok(true) => info!(user_id, "Restored session"),
                    Ok(false) => debug!("Session changed during hydration, discarding restored user"),
                    Err(e) => {
                        warn!("Failed to restore session: {}", e);
                        self.inner.reset_anonymous(generation);
                    }
                }
            }
            Ok(None) => {
                debug!("No stored session");
                self.inner.reset_anonymous(generation);
            }
            Err(e) => {
                warn!("Failed to restore session: {}", e);
                self.inner.reset_anonymous(generation);
            }
        }

        self.state()
    }

    async fn hydrate(&self) -> Result<Option<(User, Persist<'static>)>, SessionError> {
        let Some(credentials) = self.inner.store.credentials()? else {
            return Ok(None);
        };
        if let Some(user) = self.inner.store.cached_user()? {
            debug!("Hydrating from cached user");
            return Ok(Some((user, Persist::Nothing)));
        }

        let user = self.inner.fetch_user(&credentials.access_token).await?;
        Ok(Some((user, Persist::CachedUser)))
    }

    /// Log in and start the idle watchdog. On any failure stored state is
    /// left exactly as it was.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        role_hint: Option<Role>,
    ) -> Result<User, SessionError> {
        let _busy = self.inner.busy();
        let response = self
            .inner
            .gateway
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.inner.establish(response, role_hint)
    }

    /// Register a new account; same contract as `login`.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, SessionError> {
        let _busy = self.inner.busy();
        let response = self
            .inner
            .gateway
            .register(&RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            })
            .await?;
        self.inner.establish(response, None)
    }

    /// End the session. Idempotent.
    pub fn logout(&self) {
        if self.inner.end_session() {
            info!("Logged out");
            self.inner.navigator.navigate(Route::Login);
        }
    }

    /// Re-fetch the current user from the backend and republish it.
    ///
    /// Fails with `Superseded` if the session ended or was replaced while
    /// the profile was loading.
    pub async fn reload_user(&self) -> Result<User, SessionError> {
        let generation = self.inner.lock_slot().generation;
        let token = self.access_token().unwrap_or_default();
        let user = self.inner.fetch_user(&token).await?;

        let slot = self.inner.lock_slot();
        if slot.generation != generation || !self.inner.state.get().is_authenticated() {
            debug!("Session changed during reload, discarding fetched user");
            return Err(SessionError::Superseded);
        }
        self.inner.store.cache_user(&user)?;
        self.inner.state.set(AuthState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Stored access token. Pure read: no network, no side effects.
    pub fn access_token(&self) -> Option<String> {
        match self.inner.store.access_token() {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read access token: {}", e);
                None
            }
        }
    }

    /// Claims of the stored access token, if it is a readable JWT
    pub fn token_claims(&self) -> Option<Claims> {
        self.access_token().and_then(|token| decode_claims(&token).ok())
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// True while startup hydration, a login or a registration is pending
    pub fn is_loading(&self) -> bool {
        self.state().is_resolving() || self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Route guard for the host's view layer
    pub fn authorize(&self, route: Route) -> Access {
        match self.state() {
            state if state.is_resolving() => {
                if route.is_protected() {
                    Access::Pending
                } else {
                    Access::Granted
                }
            }
            AuthState::Authenticated(user) => match route.required_role() {
                Some(role) if user.role != role => Access::Forbidden,
                _ => Access::Granted,
            },
            _ => {
                if route.is_protected() {
                    Access::Redirect(Route::Login)
                } else {
                    Access::Granted
                }
            }
        }
    }

    /// Feed a user-activity signal to the idle watchdog. Ignored unless a
    /// session is authenticated.
    pub fn record_activity(&self, kind: ActivityKind) {
        let slot = self.inner.lock_slot();
        if let Some(ref watchdog) = slot.watchdog
            && self.inner.state.get().is_authenticated()
        {
            watchdog.touch(kind);
        }
    }

    pub fn is_idle_timer_armed(&self) -> bool {
        let slot = self.inner.lock_slot();
        slot.watchdog.as_ref().is_some_and(IdleWatchdog::is_running)
            && self.inner.state.get().is_authenticated()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    /// Gateway for collaborators that call protected endpoints directly
    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.state.lock_slot()
    }

    fn busy(&self) -> BusyGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        BusyGuard(&self.in_flight)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, GatewayError> {
        match decode_claims(access_token) {
            Ok(claims) if claims.role.is_admin() => self.gateway.admin_profile().await,
            _ => self.gateway.profile().await,
        }
    }

    fn establish(
        self: &Arc<Self>,
        response: AuthResponse,
        role_hint: Option<Role>,
    ) -> Result<User, SessionError> {
        let (credentials, user) = response
            .into_session()
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;

        match decode_claims(&credentials.access_token) {
            Ok(claims) => debug!(
                sub = %claims.sub,
                role = ?claims.role,
                exp = claims.exp,
                "Decoded access token"
            ),
            Err(e) => debug!("Access token is not a readable JWT: {}", e),
        }
        if let Some(hint) = role_hint
            && hint != user.role
        {
            warn!(?hint, role = ?user.role, "Role hint does not match account role");
        }

        self.commit_session(Persist::Session(&credentials), user.clone(), None)?;
        counter!("authdash_logins_total").increment(1);
        info!(user_id = user.id, "Authenticated as {}", user.email);

        self.navigator.navigate(Route::landing(user.role, role_hint));
        Ok(user)
    }

    /// Enter `Authenticated`: persist, publish the user and replace the
    /// watchdog.
    ///
    /// With `expected_generation` set, nothing happens unless the slot is
    /// still at that generation; returns whether the commit took place.
    fn commit_session(
        self: &Arc<Self>,
        persist: Persist<'_>,
        user: User,
        expected_generation: Option<u64>,
    ) -> Result<bool, SessionError> {
        let mut slot = self.lock_slot();
        if let Some(expected) = expected_generation
            && slot.generation != expected
        {
            return Ok(false);
        }

        match persist {
            Persist::Nothing => {}
            Persist::CachedUser => self.store.cache_user(&user)?,
            Persist::Session(credentials) => self.store.save_session(credentials, &user)?,
        }
        self.initialized.store(true, Ordering::SeqCst);

        slot.generation += 1;
        let generation = slot.generation;
        slot.watchdog = None;
        self.state.set(AuthState::Authenticated(user));

        let weak = Arc::downgrade(self);
        slot.watchdog = Some(IdleWatchdog::arm(
            self.idle_timeout,
            generation,
            self.state.subscribe(),
            move |generation| {
                if let Some(inner) = weak.upgrade() {
                    inner.expire_idle(generation);
                }
            },
        ));
        Ok(true)
    }

    /// Leave whatever state we are in for `Anonymous`. Returns whether the
    /// state actually changed.
    fn end_session(&self) -> bool {
        let mut slot = self.lock_slot();
        slot.generation += 1;
        slot.watchdog = None;
        self.clear_store();
        let previous = self.state.set(AuthState::Anonymous);
        previous != AuthState::Anonymous
    }

    fn expire_idle(&self, generation: u64) {
        {
            let mut slot = self.lock_slot();
            if slot.generation != generation || !self.state.get().is_authenticated() {
                debug!(generation, "Ignoring stale idle expiry");
                return;
            }
            slot.generation += 1;
            slot.watchdog = None;
            self.clear_store();
            self.state.set(AuthState::Anonymous);
        }

        counter!("authdash_idle_logouts_total").increment(1);
        info!("Session ended after inactivity");
        self.navigator.navigate(Route::Login);
    }

    /// Settle a hydration that produced no session. Skipped if anything
    /// committed since `generation`.
    fn reset_anonymous(&self, generation: u64) {
        let mut slot = self.lock_slot();
        if slot.generation != generation {
            debug!(generation, "Session changed during hydration, keeping it");
            return;
        }
        slot.generation += 1;
        slot.watchdog = None;
        self.clear_store();
        self.state.set(AuthState::Anonymous);
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            error!("Failed to clear stored session: {}", e);
        }
    }
}

struct BusyGuard<'a>(&'a AtomicUsize);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
