//! HTTP Gateway to the backend
//!
//! This module provides:
//! - `Gateway`, which attaches the stored bearer token to every request and
//!   replays a request once after a 401 by refreshing the access token
//! - typed endpoint helpers for the auth, profile and admin routes
//!
//! Concurrent 401s share one refresh: callers queue on an async mutex and a
//! waiter that finds a token other than the one it was rejected with
//! replays with that token instead of refreshing again.

mod client;
mod endpoints;
mod types;

pub use client::Gateway;
pub use types::{ApiRequest, GatewayError};
