//! Error types for the library API client.
//!
//! # Design
//! `AuthenticationExpired` gets a dedicated variant because it is the one
//! failure the client reacts to on its own (session cleared, redirect fired).
//! Every other non-2xx response lands in `RequestFailed` carrying the
//! server's `error` message so callers can show it as-is.

use thiserror::Error;

/// Message carried by [`ApiError::AuthenticationExpired`].
pub const SESSION_EXPIRED_MESSAGE: &str = "Sesión expirada";

/// Message used when a failed response has no `error` field.
pub const REQUEST_FAILED_MESSAGE: &str = "Error en la solicitud";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered 401. The session has already been cleared.
    #[error("{}", SESSION_EXPIRED_MESSAGE)]
    AuthenticationExpired,

    /// The server answered with a non-2xx status other than 401.
    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body was not valid JSON or did not have the expected shape.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("session storage failed: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status behind the error, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthenticationExpired => Some(401),
            ApiError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_authentication_expired(&self) -> bool {
        matches!(self, ApiError::AuthenticationExpired)
    }
}
