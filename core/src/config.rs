//! Client configuration.
//!
//! Values come from [`ClientConfig::default`], the `BIBLIOTECA_*` environment
//! variables, or are set directly by the embedding application.

use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_LOGIN_PATH: &str = "/index.html";
pub const DEFAULT_STORAGE_KEY: &str = "user";

pub const ENV_BASE_URL: &str = "BIBLIOTECA_API_URL";
pub const ENV_LOGIN_PATH: &str = "BIBLIOTECA_LOGIN_PATH";
pub const ENV_STORAGE_KEY: &str = "BIBLIOTECA_STORAGE_KEY";
pub const ENV_TIMEOUT_SECS: &str = "BIBLIOTECA_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root without a trailing slash, e.g. `http://localhost:5000/api`.
    pub base_url: String,
    /// Path handed to the navigator on logout and on 401.
    pub login_path: String,
    /// Storage key of the session record.
    pub storage_key: String,
    /// Global per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL) {
            config.base_url = normalize_base_url(&url);
        }
        if let Some(path) = lookup(ENV_LOGIN_PATH) {
            config.login_path = path;
        }
        if let Some(key) = lookup(ENV_STORAGE_KEY) {
            config.storage_key = key;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ApiError::Config(format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds, got {raw:?}")))?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_base_url(base_url);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
