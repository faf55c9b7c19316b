//! Authentication endpoints and the session guard.

use tracing::info;

use crate::client::{ApiClient, RequestOptions};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::session::Session;
use crate::types::{Credentials, LoginResponse, MessageResponse, Registration, Role};

/// `/auth` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// `POST /auth/login`. On success the session is stored, so every later
    /// call on the same client carries the new token.
    pub fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse =
            self.client
                .execute_as(HttpMethod::Post, "/auth/login", RequestOptions::json(&credentials)?)?;
        self.client.session().save(&Session::from_login(&response))?;
        info!(user_id = response.user.id, rol = %response.user.rol, "logged in");
        Ok(response)
    }

    /// `POST /auth/register`. The server may override `rol`; no session is
    /// created.
    pub fn register(&self, nombre: &str, email: &str, password: &str, rol: &str) -> Result<MessageResponse, ApiError> {
        let registration = Registration {
            nombre: nombre.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            rol: rol.to_string(),
        };
        self.client
            .execute_as(HttpMethod::Post, "/auth/register", RequestOptions::json(&registration)?)
    }
}

/// Session checks built on the client's session store.
#[derive(Debug, Clone, Copy)]
pub struct AuthGuard<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthGuard<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.session().get_token().is_some()
    }

    pub fn current_user(&self) -> Option<Session> {
        self.client.session().current_user()
    }

    /// Exact, case-sensitive comparison against the stored `rol`. A session
    /// without a role matches nothing.
    pub fn has_role(&self, role: impl AsRef<str>) -> bool {
        self.current_user()
            .is_some_and(|session| session.rol.as_deref() == Some(role.as_ref()))
    }

    pub fn is_librarian(&self) -> bool {
        self.has_role(Role::Bibliotecario)
    }

    /// Redirects to the login path when there is no session. Returns whether
    /// the caller may proceed.
    pub fn require_auth(&self) -> bool {
        if self.is_authenticated() {
            return true;
        }
        self.client.redirect_to_login();
        false
    }

    pub fn logout(&self) {
        info!("logging out");
        self.client.end_session();
    }
}
