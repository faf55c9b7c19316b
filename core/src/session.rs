//! Session record and the store that persists it.
//!
//! # Design
//! The session is a single JSON record under one storage key. Its presence is
//! the only authentication signal the client uses: there is no expiry
//! tracking, the server signals expiry with 401 and the record is dropped.
//!
//! `SessionStore` is passed into the client explicitly; the storage backend
//! behind it is chosen by the embedding application.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::DEFAULT_STORAGE_KEY;
use crate::error::ApiError;
use crate::types::LoginResponse;

/// The stored record of an authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// Absent in records written without a role; such a session has no role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Any other user fields the record carried.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    pub fn new(token: impl Into<String>, rol: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            rol: Some(rol.into()),
            id: None,
            nombre: None,
            email: None,
            extra: Map::new(),
        }
    }

    pub fn from_login(response: &LoginResponse) -> Self {
        Self {
            token: response.token.clone(),
            rol: Some(response.user.rol.clone()),
            id: Some(response.user.id),
            nombre: Some(response.user.nombre.clone()),
            email: Some(response.user.email.clone()),
            extra: Map::new(),
        }
    }
}

/// Key/value persistence for the session record.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ApiError>;
    fn remove(&self, key: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ApiError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        match fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ApiError::Storage(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        fs::create_dir_all(&self.dir).map_err(|e| ApiError::Storage(e.to_string()))?;
        fs::write(self.path(key), value).map_err(|e| ApiError::Storage(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), ApiError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Storage(e.to_string())),
        }
    }
}

/// Reads and writes the session record under a fixed key.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    key: String,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore").field("key", &self.key).finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), DEFAULT_STORAGE_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored session, or `None` when absent, unreadable or malformed.
    pub fn current_user(&self) -> Option<Session> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %self.key, error = %err, "could not read session record");
                return None;
            }
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(key = %self.key, error = %err, "ignoring malformed session record");
                None
            }
        }
    }

    /// The stored token. An empty token counts as absent.
    pub fn get_token(&self) -> Option<String> {
        self.current_user()
            .map(|session| session.token)
            .filter(|token| !token.is_empty())
    }

    pub fn save(&self, session: &Session) -> Result<(), ApiError> {
        let raw = serde_json::to_string(session).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.storage.set(&self.key, &raw)
    }

    pub fn clear(&self) -> Result<(), ApiError> {
        self.storage.remove(&self.key)
    }
}
