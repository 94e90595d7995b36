//! Common Test Utilities for Integration Tests
//!
//! A scriptable mock of the backend API served on an ephemeral port, plus
//! helpers to build a session manager against it.

#![allow(dead_code)]

use authdash_client::storage::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use authdash_client::{Config, MemoryStorage, Navigator, Route, SessionManager, SessionStore};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock backend
// ============================================================================

/// What `POST /refresh` does
#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// Mint this access token and start accepting it
    Issue(String),
    /// Mint a new pair
    Rotate { access: String, refresh: String },
    /// Mint a token the protected routes keep rejecting
    IssueUnaccepted(String),
    /// Answer 401
    Reject,
}

pub struct MockState {
    valid_tokens: Mutex<HashSet<String>>,
    auth_response: Mutex<(StatusCode, Value)>,
    refresh: Mutex<RefreshBehavior>,
    refresh_delay: Mutex<Duration>,
    profile_delay: Mutex<Duration>,
    pub refresh_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    refresh_tokens_seen: Mutex<Vec<String>>,
    /// `(path, Authorization header)` for every protected request
    protected_hits: Mutex<Vec<(String, Option<String>)>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            valid_tokens: Mutex::new(HashSet::new()),
            auth_response: Mutex::new((StatusCode::OK, json!({}))),
            refresh: Mutex::new(RefreshBehavior::Reject),
            refresh_delay: Mutex::new(Duration::ZERO),
            profile_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            protected_hits: Mutex::new(Vec::new()),
        }
    }

    pub fn accept_token(&self, token: &str) {
        self.valid_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn respond_to_auth(&self, status: StatusCode, body: Value) {
        *self.auth_response.lock().unwrap() = (status, body);
    }

    pub fn on_refresh(&self, behavior: RefreshBehavior) {
        *self.refresh.lock().unwrap() = behavior;
    }

    pub fn delay_refresh(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    /// Hold successful `GET /user/profile` answers for `delay`
    pub fn delay_profile(&self, delay: Duration) {
        *self.profile_delay.lock().unwrap() = delay;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().unwrap().clone()
    }

    /// Authorization headers sent to `path`, in order
    pub fn auth_headers_for(&self, path: &str) -> Vec<Option<String>> {
        self.protected_hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, auth)| auth.clone())
            .collect()
    }

    /// Record the hit and check the bearer token
    fn authorize(&self, path: &str, headers: &HeaderMap) -> bool {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.protected_hits
            .lock()
            .unwrap()
            .push((path.to_string(), auth.clone()));

        auth.and_then(|a| a.strip_prefix("Bearer ").map(str::to_string))
            .is_some_and(|token| self.valid_tokens.lock().unwrap().contains(&token))
    }
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Invalid or expired token"})),
    )
}

async fn auth_endpoint(State(state): State<Arc<MockState>>) -> (StatusCode, Json<Value>) {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    let (status, body) = state.auth_response.lock().unwrap().clone();
    (status, Json(body))
}

async fn refresh(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(token) = body["refresh_token"].as_str() {
        state
            .refresh_tokens_seen
            .lock()
            .unwrap()
            .push(token.to_string());
    }

    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let behavior = state.refresh.lock().unwrap().clone();
    match behavior {
        RefreshBehavior::Issue(token) => {
            state.accept_token(&token);
            (StatusCode::OK, Json(json!({"access_token": token})))
        }
        RefreshBehavior::Rotate { access, refresh } => {
            state.accept_token(&access);
            (
                StatusCode::OK,
                Json(json!({"access_token": access, "refresh_token": refresh})),
            )
        }
        RefreshBehavior::IssueUnaccepted(token) => {
            (StatusCode::OK, Json(json!({"access_token": token})))
        }
        RefreshBehavior::Reject => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid refresh token"})),
        ),
    }
}

async fn user_profile(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.authorize("/user/profile", &headers) {
        return unauthorized();
    }
    let delay = *state.profile_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    (StatusCode::OK, Json(user_json(1, "a@b.com", "User")))
}

async fn admin_profile(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.authorize("/admin", &headers) {
        return unauthorized();
    }
    // The backend returns the full record, password hash included.
    let mut user = user_json(7, "root@b.com", "Admin");
    user["password"] = json!("$2b$12$hash");
    (StatusCode::OK, Json(user))
}

async fn admin_dashboard(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.authorize("/admin/dashboard", &headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "user_count": 2,
            "users": [user_json(7, "root@b.com", "Admin"), user_json(1, "a@b.com", "User")]
        })),
    )
}

async fn register_admin(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !state.authorize("/admin/register", &headers) {
        return unauthorized();
    }
    let email = body["email"].as_str().unwrap_or_default();
    (StatusCode::CREATED, Json(user_json(8, email, "Admin")))
}

/// A running mock backend
pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::new());
        let app = Router::new()
            .route("/login", post(auth_endpoint))
            .route("/register", post(auth_endpoint))
            .route("/refresh", post(refresh))
            .route("/user/profile", get(user_profile))
            .route("/admin", get(admin_profile))
            .route("/admin/dashboard", get(admin_dashboard))
            .route("/admin/register", post(register_admin))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn user_json(id: i64, email: &str, role: &str) -> Value {
    json!({
        "id": id,
        "email": email,
        "first_name": "Test",
        "last_name": "User",
        "role": role
    })
}

/// Login/registration body as the backend sends it
pub fn auth_body(access: &str, refresh: &str, user: Value) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "user": user
    })
}

/// An unsigned JWT carrying the backend's claims
pub fn jwt(sub: &str, role: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&json!({"sub": sub, "role": role, "exp": 4_102_444_800i64})).unwrap(),
    );
    format!("{header}.{payload}.sig")
}

pub fn seeded_storage(access: &str, refresh: Option<&str>, user: Option<Value>) -> Arc<MemoryStorage> {
    let mut entries = vec![(ACCESS_TOKEN_KEY.to_string(), access.to_string())];
    if let Some(refresh) = refresh {
        entries.push((REFRESH_TOKEN_KEY.to_string(), refresh.to_string()));
    }
    if let Some(user) = user {
        entries.push((USER_KEY.to_string(), user.to_string()));
    }
    Arc::new(MemoryStorage::with_entries(entries))
}

// ============================================================================
// Session context
// ============================================================================

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

pub struct TestSession {
    pub backend: MockBackend,
    pub manager: SessionManager,
    pub storage: Arc<MemoryStorage>,
    pub navigator: Arc<RecordingNavigator>,
}

impl TestSession {
    pub async fn start(storage: Arc<MemoryStorage>) -> Self {
        let backend = MockBackend::start().await;
        let mut config = Config::default();
        config.api.base_url = backend.base_url.clone();

        let navigator = Arc::new(RecordingNavigator::default());
        let manager = SessionManager::new(&config, storage.clone(), navigator.clone())
            .expect("Failed to build session manager");

        Self {
            backend,
            manager,
            storage,
            navigator,
        }
    }

    pub fn mock(&self) -> &MockState {
        &self.backend.state
    }

    pub fn store(&self) -> SessionStore {
        SessionStore::new(self.storage.clone())
    }
}
