//! Navigation collaborator and route guards
//!
//! The session layer never renders anything. It tells the host which view
//! to show through a `Navigator`, and answers "may this view render now?"
//! through `SessionManager::authorize`.

use std::fmt;

use tracing::info;

use crate::protocol::Role;

/// Views the session layer knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    /// Anonymous entry point
    Login,
    Register,
    Profile,
    Admin,
    AdminRegister,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Profile => "/profile",
            Route::Admin => "/admin",
            Route::AdminRegister => "/admin/register",
        }
    }

    /// Whether the view needs an authenticated session at all
    pub fn is_protected(self) -> bool {
        matches!(self, Route::Profile | Route::Admin | Route::AdminRegister)
    }

    /// Role the view is gated on, if any
    pub fn required_role(self) -> Option<Role> {
        match self {
            Route::Admin | Route::AdminRegister => Some(Role::Admin),
            _ => None,
        }
    }

    /// Where a freshly authenticated user lands
    pub fn landing(role: Role, role_hint: Option<Role>) -> Route {
        if role.is_admin() && role_hint.is_some_and(Role::is_admin) {
            Route::Admin
        } else {
            Route::Profile
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Outcome of a route guard check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Session state is not resolved yet; render nothing protected
    Pending,
    Granted,
    /// Send the user elsewhere (typically the login page)
    Redirect(Route),
    /// Authenticated, but the role does not match
    Forbidden,
}

/// Receives navigation commands from the session layer
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator for hosts without a view layer: records the request in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: Route) {
        info!("Navigate to {}", route);
    }
}
