//! The request facade shared by every resource client.
//!
//! # Design
//! One call is split the same way everywhere: `build_request` produces an
//! `HttpRequest` (headers from the session store, JSON body, encoded query),
//! the transport executes it, and `handle_response` normalizes the
//! `HttpResponse`. Both halves are public so hosts that do their own I/O can
//! drive the client without a transport.
//!
//! Normalization:
//! - 401 clears the session, fires the navigator and fails with
//!   `AuthenticationExpired`, whatever the body says.
//! - Any other body is parsed as JSON; a parse failure propagates.
//! - Non-2xx fails with `RequestFailed`, message from the body's `error`.
//! - 2xx returns the parsed JSON unchanged.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{AuthApi, AuthGuard};
use crate::books::BooksApi;
use crate::config::ClientConfig;
use crate::error::{ApiError, REQUEST_FAILED_MESSAGE};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::loans::LoansApi;
use crate::navigator::{Navigator, NoopNavigator};
use crate::session::SessionStore;
use crate::transport::{Transport, UreqTransport};
use crate::users::UsersApi;

/// Optional body and query string for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json<T: Serialize + ?Sized>(body: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(Self {
            body: Some(body),
            query: Vec::new(),
        })
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }
}

/// Authenticated client for the library API.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    session: SessionStore,
    transport: Arc<dyn Transport>,
    navigator: Arc<dyn Navigator>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client using the blocking `ureq` transport and no redirect handling.
    pub fn new(config: ClientConfig, session: SessionStore) -> Self {
        let transport = UreqTransport::new(config.timeout);
        Self {
            config,
            session,
            transport: Arc::new(transport),
            navigator: Arc::new(NoopNavigator),
        }
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn with_navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Arc::new(navigator);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn books(&self) -> BooksApi<'_> {
        BooksApi::new(self)
    }

    pub fn loans(&self) -> LoansApi<'_> {
        LoansApi::new(self)
    }

    pub fn users(&self) -> UsersApi<'_> {
        UsersApi::new(self)
    }

    /// Session checks, role checks and logout.
    pub fn guard(&self) -> AuthGuard<'_> {
        AuthGuard::new(self)
    }

    /// `GET /health`. Reports server and database status.
    pub fn health(&self) -> Result<Value, ApiError> {
        self.execute(HttpMethod::Get, "/health", RequestOptions::new())
    }

    /// JSON content type, plus a bearer token when a session exists.
    pub fn build_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
        if let Some(token) = self.session.get_token() {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        headers
    }

    pub fn build_request(&self, method: HttpMethod, path: &str, options: RequestOptions) -> HttpRequest {
        let mut url = format!("{}{}", self.config.base_url, path);
        if !options.query.is_empty() {
            let query = options
                .query
                .iter()
                .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
                .collect::<Vec<_>>()
                .join("&");
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
        HttpRequest {
            method,
            url,
            headers: self.build_headers(),
            body: options.body.map(|body| body.to_string()),
        }
    }

    pub fn handle_response(&self, response: HttpResponse) -> Result<Value, ApiError> {
        if response.status == 401 {
            warn!(login_path = %self.config.login_path, "server rejected the session; logging out");
            self.end_session();
            return Err(ApiError::AuthenticationExpired);
        }

        let data: Value =
            serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))?;

        if !response.is_success() {
            let message = error_message(&data);
            debug!(status = response.status, %message, "request failed");
            return Err(ApiError::RequestFailed {
                status: response.status,
                message,
            });
        }
        Ok(data)
    }

    /// Build, send and normalize one call.
    pub fn execute(&self, method: HttpMethod, path: &str, options: RequestOptions) -> Result<Value, ApiError> {
        let request = self.build_request(method, path, options);
        debug!(method = %request.method, url = %request.url, "dispatching request");
        let response = self.transport.send(&request)?;
        self.handle_response(response)
    }

    /// [`execute`](Self::execute), then deserialize the result into `T`.
    pub fn execute_as<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let data = self.execute(method, path, options)?;
        serde_json::from_value(data).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Drop the stored session and send the user to the login path.
    pub(crate) fn end_session(&self) {
        if let Err(err) = self.session.clear() {
            warn!(error = %err, "could not clear session record");
        }
        self.navigator.redirect(&self.config.login_path);
    }

    pub(crate) fn redirect_to_login(&self) {
        self.navigator.redirect(&self.config.login_path);
    }
}

/// The body's `error` string, or the generic fallback.
fn error_message(body: &Value) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(REQUEST_FAILED_MESSAGE)
        .to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;

    /// Replays canned responses and records every request it receives.
    #[derive(Clone, Default)]
    pub struct StubTransport {
        responses: Arc<Mutex<VecDeque<HttpResponse>>>,
        pub requests: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl StubTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, status: u16, body: &str) -> &Self {
            self.responses.lock().push_back(HttpResponse::new(status, body));
            self
        }

        pub fn last_request(&self) -> HttpRequest {
            self.requests.lock().last().cloned().expect("no request was sent")
        }
    }

    impl Transport for StubTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.lock().push(request.clone());
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| ApiError::Transport("no canned response".to_string()))
        }
    }

    /// Counts redirects and remembers the last target.
    #[derive(Clone, Default)]
    pub struct RecordingNavigator {
        pub redirects: Arc<Mutex<Vec<String>>>,
    }

    impl Navigator for RecordingNavigator {
        fn redirect(&self, path: &str) {
            self.redirects.lock().push(path.to_string());
        }
    }

    pub fn client_with(stub: &StubTransport, navigator: &RecordingNavigator) -> ApiClient {
        ApiClient::new(ClientConfig::new("http://localhost:5000/api"), SessionStore::in_memory())
            .with_transport(stub.clone())
            .with_navigator(navigator.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::*;
    use super::*;
    use crate::error::SESSION_EXPIRED_MESSAGE;
    use crate::session::Session;

    fn setup() -> (ApiClient, StubTransport, RecordingNavigator) {
        let stub = StubTransport::new();
        let navigator = RecordingNavigator::default();
        let client = client_with(&stub, &navigator);
        (client, stub, navigator)
    }

    #[test]
    fn headers_without_session_have_no_authorization() {
        let (client, _, _) = setup();
        let headers = client.build_headers();
        assert_eq!(headers, vec![("content-type".to_string(), "application/json".to_string())]);
    }

    #[test]
    fn headers_with_session_carry_bearer_token() {
        let (client, _, _) = setup();
        client.session().save(&Session::new("abc123", "LECTOR")).unwrap();
        let req = client.build_request(HttpMethod::Get, "/libros/generos", RequestOptions::new());
        assert_eq!(req.header("authorization"), Some("Bearer abc123"));
        assert_eq!(req.header("content-type"), Some("application/json"));
    }

    #[test]
    fn build_request_joins_base_url_and_encodes_query() {
        let (client, _, _) = setup();
        let options = RequestOptions::new().query("titulo", "cien años").query("limit", 5);
        let req = client.build_request(HttpMethod::Get, "/libros/search", options);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.url,
            "http://localhost:5000/api/libros/search?titulo=cien%20a%C3%B1os&limit=5"
        );
        assert!(req.body.is_none());
    }

    #[test]
    fn build_request_serializes_body() {
        let (client, _, _) = setup();
        let options = RequestOptions::json(&json!({"activo": "N"})).unwrap();
        let req = client.build_request(HttpMethod::Patch, "/usuarios/4/estado", options);
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"activo": "N"}));
    }

    #[test]
    fn success_returns_body_unchanged() {
        let (client, stub, _) = setup();
        stub.respond(200, r#"{"status":"healthy","database":"connected"}"#);
        let data = client.health().unwrap();
        assert_eq!(data, json!({"status": "healthy", "database": "connected"}));
        assert_eq!(stub.last_request().url, "http://localhost:5000/api/health");
    }

    #[test]
    fn unauthorized_clears_session_and_redirects() {
        let (client, stub, navigator) = setup();
        client.session().save(&Session::new("stale", "LECTOR")).unwrap();
        stub.respond(401, r#"{"error":"Token inválido"}"#);

        let err = client.health().unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationExpired));
        assert_eq!(err.to_string(), SESSION_EXPIRED_MESSAGE);
        assert!(client.session().get_token().is_none());
        assert_eq!(*navigator.redirects.lock(), vec!["/index.html".to_string()]);
    }

    #[test]
    fn unauthorized_ignores_non_json_body() {
        let (client, stub, navigator) = setup();
        stub.respond(401, "<html>Unauthorized</html>");
        let err = client.health().unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationExpired));
        assert_eq!(navigator.redirects.lock().len(), 1);
    }

    #[test]
    fn failure_message_comes_from_error_field() {
        let (client, stub, navigator) = setup();
        stub.respond(404, r#"{"error":"Libro no encontrado"}"#);
        let err = client.books().get(99).unwrap_err();
        match err {
            ApiError::RequestFailed { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Libro no encontrado");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(navigator.redirects.lock().is_empty());
    }

    #[test]
    fn failure_without_error_field_uses_fallback() {
        let (client, stub, _) = setup();
        stub.respond(500, r#"{"detail":"boom"}"#);
        let err = client.health().unwrap_err();
        assert_eq!(err.to_string(), REQUEST_FAILED_MESSAGE);
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn forbidden_keeps_the_session() {
        let (client, stub, navigator) = setup();
        client.session().save(&Session::new("tok", "LECTOR")).unwrap();
        stub.respond(403, r#"{"error":"No tiene permisos para realizar esta acción"}"#);
        let err = client.books().delete(1).unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(client.session().get_token().as_deref(), Some("tok"));
        assert!(navigator.redirects.lock().is_empty());
    }

    #[test]
    fn malformed_body_propagates_as_deserialization_error() {
        let (client, stub, _) = setup();
        stub.respond(200, "not json");
        let err = client.health().unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));

        stub.respond(502, "Bad Gateway");
        let err = client.health().unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn transport_failure_propagates() {
        let (client, _, _) = setup();
        let err = client.health().unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
