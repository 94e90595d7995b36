use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::idle::IdleWatchdog;
use crate::protocol::User;

/// Session lifecycle.
///
/// `Uninitialized -> Hydrating -> {Authenticated, Anonymous}`, and
/// `Authenticated -> Anonymous` on logout, idle expiry or refresh exhaustion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Uninitialized,
    Hydrating,
    Authenticated(User),
    Anonymous,
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    /// True until the startup hydration has resolved
    pub fn is_resolving(&self) -> bool {
        matches!(self, AuthState::Uninitialized | AuthState::Hydrating)
    }
}

/// User activity signals that keep an authenticated session alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        ActivityKind::PointerDown,
        ActivityKind::PointerMove,
        ActivityKind::KeyPress,
        ActivityKind::Scroll,
        ActivityKind::TouchStart,
    ];
}

/// What a commit swaps along with the published state
#[derive(Default)]
pub(crate) struct SessionSlot {
    /// Bumped on every transition into or out of `Authenticated` and on
    /// every teardown
    pub(crate) generation: u64,
    pub(crate) watchdog: Option<IdleWatchdog>,
}

/// Shared, observable holder of the current `AuthState`.
///
/// Everything that writes credentials or changes the state (the manager
/// and the gateway alike) does so while holding the slot lock, so a
/// check-then-write against the store cannot interleave with another
/// commit. The lock is never held across an await.
#[derive(Clone)]
pub struct StateCell {
    shared: Arc<Shared>,
}

struct Shared {
    tx: watch::Sender<AuthState>,
    slot: Mutex<SessionSlot>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateCell").field(&*self.shared.tx.borrow()).finish()
    }
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::Uninitialized);
        Self {
            shared: Arc::new(Shared {
                tx,
                slot: Mutex::new(SessionSlot::default()),
            }),
        }
    }

    pub fn get(&self) -> AuthState {
        self.shared.tx.borrow().clone()
    }

    /// Publish a new state, returning the previous one
    pub fn set(&self, state: AuthState) -> AuthState {
        self.shared.tx.send_replace(state)
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.shared.tx.subscribe()
    }

    pub(crate) fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
