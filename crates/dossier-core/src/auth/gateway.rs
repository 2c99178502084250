//! The authenticated request gateway.
//!
//! Every outbound call to the record service goes through
//! [`AuthenticatedGateway::call`], which attaches the current access
//! credential and owns the renew-and-replay discipline: a 401-equivalent
//! status is the sole trigger for renewal, the replay happens exactly
//! once, and a second rejection ends the session. The retry bound is a
//! counter in a loop, not recursion, so termination is structural.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::AuthError;
use super::refresh::RefreshCoordinator;
use crate::credentials::{CredentialStore, TerminalErrorKind};

/// HTTP status treated as an authorization failure.
const STATUS_UNAUTHORIZED: u16 = 401;

/// Renewals a single call may consume before the session is declared
/// dead.
const MAX_RENEWALS_PER_CALL: u32 = 1;

/// Request method vocabulary of the record service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read.
    Get,
    /// Create or act.
    Post,
    /// Replace.
    Put,
    /// Remove.
    Delete,
}

impl Method {
    /// Returns the method as its wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// An outbound request, before credentials are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Request method.
    pub method: Method,
    /// Path relative to the service base URL, starting with `/`.
    pub path: String,
    /// JSON body, for methods that carry one.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Builds a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// Builds a POST request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    /// Builds a bodyless POST request.
    #[must_use]
    pub fn post_empty(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: None,
        }
    }

    /// Builds a DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// A response as seen by the gateway: status plus decoded JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded body; `Value::Null` when the response had none.
    pub body: Value,
}

impl ApiResponse {
    /// Creates a response.
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Extracts a human-readable error message from the body.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| self.body.to_string(), ToString::to_string)
    }
}

/// Transport failure below the HTTP layer (DNS, TCP, TLS, timeout).
#[derive(Debug, thiserror::Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    /// Failure description.
    pub message: String,
}

/// Carries a request to the record service.
///
/// Implementations attach `access_token` as a bearer header and must
/// return `Ok` for any response the service produced, reserving `Err` for
/// failures below the HTTP layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes `request` with the given access credential attached.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was obtained at all.
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: &SecretString,
    ) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: &SecretString,
    ) -> Result<ApiResponse, TransportError> {
        self.as_ref().execute(request, access_token).await
    }
}

/// Wraps a [`Transport`] with credential attachment and bounded
/// renew-and-replay.
pub struct AuthenticatedGateway<T: Transport> {
    transport: T,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl<T: Transport> AuthenticatedGateway<T> {
    /// Creates a gateway over `transport`.
    #[must_use]
    pub fn new(
        transport: T,
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
        }
    }

    /// Issues `request` with the current access credential.
    ///
    /// On a 401-equivalent response the gateway renews through the
    /// coordinator and replays the request exactly once with the renewed
    /// credential; the replayed credential is always of a generation at
    /// least as new as the one that failed. A second 401 marks the session
    /// terminal instead of renewing again.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingCredential`] when signed out (no I/O
    ///   happens).
    /// - [`AuthError::SessionExpired`] when renewal failed or a renewed
    ///   credential was rejected; the watchdog takes over from there.
    /// - [`AuthError::Transient`] for connectivity failures.
    /// - [`AuthError::Api`] for any non-2xx, non-401 response, passed
    ///   through for the caller to report.
    pub async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        let (state, snapshot_generation) = self.store.snapshot()?;
        let Some(session) = state.session() else {
            return Err(AuthError::MissingCredential);
        };
        if let Some(kind) = session.terminal_error() {
            // A refresh already failed for this session; do not knock on
            // the service again.
            return Err(AuthError::SessionExpired { kind });
        }

        let mut access_token = session.tokens().access_token.clone();
        let mut generation = snapshot_generation;
        let mut renewals: u32 = 0;

        loop {
            let response = self
                .transport
                .execute(request, &access_token)
                .await
                .map_err(|e| AuthError::Transient { message: e.message })?;

            if response.status != STATUS_UNAUTHORIZED {
                return Self::into_result(response);
            }

            if renewals >= MAX_RENEWALS_PER_CALL {
                warn!(path = %request.path, "renewed credential rejected; ending session");
                self.store
                    .mark_terminal_error(TerminalErrorKind::CredentialRejected)?;
                return Err(AuthError::SessionExpired {
                    kind: TerminalErrorKind::CredentialRejected,
                });
            }

            debug!(path = %request.path, "authorization failure; renewing credential");
            let (renewed_token, renewed_generation) =
                self.coordinator.ensure_fresh_credential(generation).await?;
            access_token = renewed_token;
            generation = renewed_generation;
            renewals += 1;
        }
    }

    /// Maps a non-401 response to the caller-facing result.
    fn into_result(response: ApiResponse) -> Result<ApiResponse, AuthError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(AuthError::Api {
                status: response.status,
                message: response.error_message(),
            })
        }
    }
}

impl<T: Transport> std::fmt::Debug for AuthenticatedGateway<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedGateway")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Scripted transport for tests.
///
/// Responds from a queue and records every request together with the
/// bearer token it carried, so tests can assert on both call counts and
/// the credential generation actually used.
#[derive(Default)]
pub struct MockTransport {
    script: std::sync::Mutex<Vec<Result<ApiResponse, TransportError>>>,
    seen: std::sync::Mutex<Vec<(ApiRequest, String)>>,
}

impl MockTransport {
    /// Creates a mock with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response. Responses are consumed in push order.
    pub fn push(&self, result: Result<ApiResponse, TransportError>) {
        self.script.lock().expect("mock script lock").push(result);
    }

    /// Queues a successful JSON response.
    pub fn push_json(&self, status: u16, body: Value) {
        self.push(Ok(ApiResponse::new(status, body)));
    }

    /// Returns the requests executed so far with their bearer tokens.
    #[must_use]
    pub fn seen(&self) -> Vec<(ApiRequest, String)> {
        self.seen.lock().expect("mock seen lock").clone()
    }

    /// Returns how many requests reached the mock.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.seen.lock().expect("mock seen lock").len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: &SecretString,
    ) -> Result<ApiResponse, TransportError> {
        use secrecy::ExposeSecret;

        self.seen
            .lock()
            .expect("mock seen lock")
            .push((request.clone(), access_token.expose_secret().to_string()));

        let mut script = self.script.lock().expect("mock script lock");
        if script.is_empty() {
            return Err(TransportError {
                message: "mock script exhausted".to_string(),
            });
        }
        script.remove(0)
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::auth::refresh::{MockRenewalApi, RenewalError};
    use crate::credentials::{Principal, Session, SessionState, TokenSet};
    use crate::permissions::{Role, RoleSet};

    fn tokens(tag: &str) -> TokenSet {
        let now = Utc::now();
        TokenSet {
            access_token: SecretString::from(format!("access-{tag}")),
            access_expires_at: now + Duration::minutes(15),
            refresh_token: SecretString::from(format!("refresh-{tag}")),
            refresh_expires_at: now + Duration::days(7),
        }
    }

    struct Fixture {
        store: Arc<CredentialStore>,
        renewal: Arc<MockRenewalApi>,
        transport: Arc<MockTransport>,
        gateway: AuthenticatedGateway<Arc<MockTransport>>,
    }

    fn signed_in_fixture() -> Fixture {
        let store = Arc::new(CredentialStore::new());
        store
            .replace(Session::new(
                Principal::new("u1", RoleSet::from([Role::Advisor])),
                tokens("0"),
            ))
            .unwrap();

        let renewal = Arc::new(MockRenewalApi::new());
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), renewal.clone()));
        let transport = Arc::new(MockTransport::new());
        let gateway = AuthenticatedGateway::new(transport.clone(), store.clone(), coordinator);

        Fixture {
            store,
            renewal,
            transport,
            gateway,
        }
    }

    #[tokio::test]
    async fn test_success_passes_through_with_bearer_attached() {
        let fixture = signed_in_fixture();
        fixture
            .transport
            .push_json(200, serde_json::json!({"ok": true}));

        let response = fixture
            .gateway
            .call(&ApiRequest::get("/records"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let seen = fixture.transport.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, "access-0");
    }

    #[tokio::test]
    async fn test_signed_out_fails_without_io() {
        let store = Arc::new(CredentialStore::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            Arc::new(MockRenewalApi::new()),
        ));
        let transport = Arc::new(MockTransport::new());
        let gateway = AuthenticatedGateway::new(transport.clone(), store, coordinator);

        let err = gateway.call(&ApiRequest::get("/records")).await.unwrap_err();

        assert!(matches!(err, AuthError::MissingCredential));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_single_401_renews_and_replays_once() {
        let fixture = signed_in_fixture();
        fixture.transport.push_json(401, Value::Null);
        fixture
            .transport
            .push_json(200, serde_json::json!({"ok": true}));
        fixture.renewal.push(Ok(tokens("1")));

        let response = fixture
            .gateway
            .call(&ApiRequest::get("/records"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(fixture.renewal.calls(), 1);

        // The replay used the renewed credential, not the one that failed.
        let seen = fixture.transport.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, "access-0");
        assert_eq!(seen[1].1, "access-1");
    }

    #[tokio::test]
    async fn test_second_401_is_terminal_without_second_renewal() {
        let fixture = signed_in_fixture();
        fixture.transport.push_json(401, Value::Null);
        fixture.transport.push_json(401, Value::Null);
        fixture.renewal.push(Ok(tokens("1")));

        let err = fixture
            .gateway
            .call(&ApiRequest::get("/records"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthError::SessionExpired {
                kind: TerminalErrorKind::CredentialRejected,
            }
        ));
        assert_eq!(fixture.renewal.calls(), 1, "no second renewal");
        assert_eq!(fixture.transport.calls(), 2, "no third attempt");

        let state = fixture.store.read().unwrap();
        assert_eq!(
            state.session().unwrap().terminal_error(),
            Some(TerminalErrorKind::CredentialRejected)
        );
    }

    #[tokio::test]
    async fn test_terminal_session_short_circuits() {
        let fixture = signed_in_fixture();
        fixture
            .store
            .mark_terminal_error(TerminalErrorKind::RefreshRejected)
            .unwrap();

        let err = fixture
            .gateway
            .call(&ApiRequest::get("/records"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::SessionExpired { .. }));
        assert_eq!(fixture.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_renewal_propagates_session_expiry() {
        let fixture = signed_in_fixture();
        fixture.transport.push_json(401, Value::Null);
        fixture.renewal.push(Err(RenewalError::Rejected {
            detail: "revoked".to_string(),
        }));

        let err = fixture
            .gateway
            .call(&ApiRequest::get("/records"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthError::SessionExpired {
                kind: TerminalErrorKind::RefreshRejected,
            }
        ));
        assert_eq!(fixture.transport.calls(), 1, "no replay after failed renewal");
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through_without_renewal() {
        let fixture = signed_in_fixture();
        fixture
            .transport
            .push_json(422, serde_json::json!({"message": "invalid payload"}));

        let err = fixture
            .gateway
            .call(&ApiRequest::get("/records"))
            .await
            .unwrap_err();

        match err {
            AuthError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "invalid payload");
            },
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(fixture.renewal.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_transient() {
        let fixture = signed_in_fixture();
        fixture.transport.push(Err(TransportError {
            message: "connection refused".to_string(),
        }));

        let err = fixture
            .gateway
            .call(&ApiRequest::get("/records"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Transient { .. }));

        // The session is untouched; nothing was marked terminal.
        let state = fixture.store.read().unwrap();
        assert!(matches!(state, SessionState::Active(_)));
        assert!(state.session().unwrap().terminal_error().is_none());
    }
}
