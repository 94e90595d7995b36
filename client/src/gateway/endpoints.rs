//! Typed helpers for the backend routes

use super::client::Gateway;
use super::types::{ApiRequest, GatewayError};
use crate::protocol::{AdminDashboard, AuthResponse, LoginRequest, RegisterRequest, User};

impl Gateway {
    /// `POST /login`
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, GatewayError> {
        self.send(ApiRequest::post("/login", request)?.public()).await
    }

    /// `POST /register`
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, GatewayError> {
        self.send(ApiRequest::post("/register", request)?.public()).await
    }

    /// `GET /user/profile`
    pub async fn profile(&self) -> Result<User, GatewayError> {
        self.send(ApiRequest::get("/user/profile")).await
    }

    /// `GET /admin`: the caller's own record, admin only
    pub async fn admin_profile(&self) -> Result<User, GatewayError> {
        self.send(ApiRequest::get("/admin")).await
    }

    /// `GET /admin/dashboard`
    pub async fn admin_dashboard(&self) -> Result<AdminDashboard, GatewayError> {
        self.send(ApiRequest::get("/admin/dashboard")).await
    }

    /// `POST /admin/register`: create another admin account
    pub async fn register_admin(&self, request: &RegisterRequest) -> Result<User, GatewayError> {
        self.send(ApiRequest::post("/admin/register", request)?).await
    }
}
