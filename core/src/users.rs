//! `/usuarios` endpoints.

use serde_json::json;

use crate::client::{ApiClient, RequestOptions};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::types::{MessageResponse, NewUser, User, UserUpdate};

#[derive(Debug, Clone, Copy)]
pub struct UsersApi<'a> {
    client: &'a ApiClient,
}

impl<'a> UsersApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn list(&self) -> Result<Vec<User>, ApiError> {
        self.client
            .execute_as(HttpMethod::Get, "/usuarios/", RequestOptions::new())
    }

    pub fn get(&self, id: i64) -> Result<User, ApiError> {
        self.client
            .execute_as(HttpMethod::Get, &format!("/usuarios/{id}"), RequestOptions::new())
    }

    /// Create a user with any role. Librarian only.
    pub fn create_admin(&self, user: &NewUser) -> Result<MessageResponse, ApiError> {
        self.client
            .execute_as(HttpMethod::Post, "/usuarios/admin", RequestOptions::json(user)?)
    }

    pub fn update(&self, id: i64, user: &UserUpdate) -> Result<MessageResponse, ApiError> {
        self.client
            .execute_as(HttpMethod::Put, &format!("/usuarios/{id}"), RequestOptions::json(user)?)
    }

    /// Activate or deactivate an account. The wire flag is `S`/`N`.
    pub fn toggle_active(&self, id: i64, active: bool) -> Result<MessageResponse, ApiError> {
        let flag = if active { "S" } else { "N" };
        let options = RequestOptions::json(&json!({ "activo": flag }))?;
        self.client
            .execute_as(HttpMethod::Patch, &format!("/usuarios/{id}/estado"), options)
    }

    pub fn delete(&self, id: i64) -> Result<MessageResponse, ApiError> {
        self.client
            .execute_as(HttpMethod::Delete, &format!("/usuarios/{id}"), RequestOptions::new())
    }
}
