//! Session expiry end to end: a renewed credential that is still rejected
//! ends the session, and the watchdog walks the user out.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use dossier_core::auth::refresh::MockRenewalApi;
use dossier_core::auth::MockTransport;
use dossier_core::{
    ApiRequest, AuthError, AuthenticatedGateway, CredentialStore, Principal, RefreshCoordinator,
    Role, RoleSet, Session, SessionWatchdog, SignOutHandler, TerminalErrorKind, TokenSet,
    WatchdogConfig,
};
use secrecy::SecretString;

struct RecordingHandler {
    events: Mutex<Vec<TerminalErrorKind>>,
    tx: tokio::sync::mpsc::UnboundedSender<TerminalErrorKind>,
}

impl SignOutHandler for RecordingHandler {
    fn on_forced_sign_out(&self, kind: TerminalErrorKind) {
        self.events.lock().unwrap().push(kind);
        let _ = self.tx.send(kind);
    }
}

fn tokens(tag: &str) -> TokenSet {
    let now = Utc::now();
    TokenSet {
        access_token: SecretString::from(format!("access-{tag}")),
        access_expires_at: now + ChronoDuration::minutes(15),
        refresh_token: SecretString::from(format!("refresh-{tag}")),
        refresh_expires_at: now + ChronoDuration::days(7),
    }
}

#[tokio::test]
async fn test_second_rejection_signs_the_user_out() {
    let store = Arc::new(CredentialStore::new());
    store
        .replace(Session::new(
            Principal::new("u1", RoleSet::from([Role::Advisor])),
            tokens("0"),
        ))
        .unwrap();

    let renewal = Arc::new(MockRenewalApi::new());
    renewal.push(Ok(tokens("1")));
    let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), renewal.clone()));

    let transport = Arc::new(MockTransport::new());
    transport.push_json(401, serde_json::Value::Null);
    transport.push_json(401, serde_json::Value::Null);
    let gateway = AuthenticatedGateway::new(transport.clone(), store.clone(), coordinator);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handler = Arc::new(RecordingHandler {
        events: Mutex::new(Vec::new()),
        tx,
    });
    let watchdog = SessionWatchdog::spawn(store.clone(), handler.clone(), WatchdogConfig::default());

    // Both the original and the renewed credential come back rejected.
    let err = gateway.call(&ApiRequest::get("/records")).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::SessionExpired {
            kind: TerminalErrorKind::CredentialRejected,
        }
    ));
    assert_eq!(renewal.calls(), 1, "exactly one renewal attempt");
    assert_eq!(transport.calls(), 2, "original attempt plus one replay");

    // The watchdog observes the terminal flag and clears the session.
    let kind = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("watchdog should sign out")
        .expect("handler alive");
    assert_eq!(kind, TerminalErrorKind::CredentialRejected);
    assert!(!store.read().unwrap().is_active());
    assert_eq!(handler.events.lock().unwrap().len(), 1);

    // Follow-up calls fail locally: there is no credential left to attach.
    let err = gateway.call(&ApiRequest::get("/records")).await.unwrap_err();
    assert!(matches!(err, AuthError::MissingCredential));
    assert_eq!(transport.calls(), 2);

    watchdog.shutdown();
}

#[tokio::test]
async fn test_concurrent_victims_share_one_renewal_end_to_end() {
    let store = Arc::new(CredentialStore::new());
    store
        .replace(Session::new(
            Principal::new("u1", RoleSet::from([Role::Advisor])),
            tokens("0"),
        ))
        .unwrap();

    let renewal = Arc::new(MockRenewalApi::new());
    renewal.push(Ok(tokens("1")));
    let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), renewal.clone()));

    // Every request fails on the stale credential once, then succeeds on
    // the renewed one.
    let transport = Arc::new(StaleTokenTransport::new());
    let gateway = Arc::new(AuthenticatedGateway::new(
        transport.clone(),
        store.clone(),
        coordinator,
    ));

    let mut handles = Vec::new();
    for i in 0..6 {
        let gateway = Arc::clone(&gateway);
        handles.push(tokio::spawn(async move {
            gateway.call(&ApiRequest::get(format!("/records/rec-{i}"))).await
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
    }

    assert_eq!(
        renewal.calls(),
        1,
        "near-simultaneous failures must funnel into one renewal"
    );
}

/// Transport that 401s any request carrying the stale credential and
/// accepts the renewed one, mimicking a service that stopped honoring the
/// old token.
struct StaleTokenTransport;

impl StaleTokenTransport {
    fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl dossier_core::Transport for StaleTokenTransport {
    async fn execute(
        &self,
        _request: &ApiRequest,
        access_token: &SecretString,
    ) -> Result<dossier_core::ApiResponse, dossier_core::TransportError> {
        use secrecy::ExposeSecret;

        if access_token.expose_secret() == "access-0" {
            return Ok(dossier_core::ApiResponse::new(401, serde_json::Value::Null));
        }
        Ok(dossier_core::ApiResponse::new(
            200,
            serde_json::json!({ "ok": true }),
        ))
    }
}
