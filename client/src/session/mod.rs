pub mod idle;
pub mod manager;
pub mod state;

pub use idle::IdleWatchdog;
pub use manager::{SessionError, SessionManager};
pub use state::{ActivityKind, AuthState, StateCell};
