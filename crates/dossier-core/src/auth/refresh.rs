//! Single-flight credential renewal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::error::AuthError;
use crate::credentials::{CredentialStore, SessionState, TerminalErrorKind, TokenSet};

/// Errors from the renewal endpoint.
#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    /// The identity service refused the refresh credential. Terminal.
    #[error("refresh credential rejected: {detail}")]
    Rejected {
        /// Rejection detail from the response body.
        detail: String,
    },

    /// The renewal call failed for some other reason (connectivity,
    /// service outage). Not terminal; the next authorization failure will
    /// try again.
    #[error("renewal call failed: {message}")]
    Failed {
        /// Failure description.
        message: String,
    },
}

/// The identity service's renewal endpoint.
///
/// Takes the refresh credential, returns a freshly minted token pair.
#[async_trait]
pub trait RenewalApi: Send + Sync {
    /// Exchanges `refresh_token` for a new token pair.
    ///
    /// # Errors
    ///
    /// Returns [`RenewalError::Rejected`] when the service refuses the
    /// refresh credential, [`RenewalError::Failed`] otherwise.
    async fn renew(&self, refresh_token: &SecretString) -> Result<TokenSet, RenewalError>;
}

/// Serializes credential renewal across concurrent callers.
///
/// Every caller that finds its access credential rejected funnels through
/// [`ensure_fresh_credential`](Self::ensure_fresh_credential). A flight
/// lock guarantees at most one renewal call is in the air; callers that
/// queued behind it observe the bumped store generation on wake-up and
/// reuse the credential the first caller minted, so N near-simultaneous
/// failures produce exactly one network call.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    renewal: Arc<dyn RenewalApi>,
    flight: Mutex<()>,
}

impl RefreshCoordinator {
    /// Creates a coordinator over the given store and renewal endpoint.
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, renewal: Arc<dyn RenewalApi>) -> Self {
        Self {
            store,
            renewal,
            flight: Mutex::new(()),
        }
    }

    /// Returns an access credential at least as new as `failed_generation`.
    ///
    /// `failed_generation` is the store generation of the credential the
    /// caller saw fail (or saw expired). If the store moved past that
    /// generation while the caller waited for the flight lock, another
    /// caller already renewed and the stored credential is returned
    /// without a second network call.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingCredential`] when signed out.
    /// - [`AuthError::SessionExpired`] when the refresh credential is
    ///   expired or the identity service rejected it. The store carries
    ///   the terminal flag afterwards, so every queued caller fails the
    ///   same way without further network calls.
    /// - [`AuthError::Transient`] when the renewal call itself failed for
    ///   connectivity reasons; the session is untouched and the caller may
    ///   retry manually.
    pub async fn ensure_fresh_credential(
        &self,
        failed_generation: u64,
    ) -> Result<(SecretString, u64), AuthError> {
        let _flight = self.flight.lock().await;

        // One consistent view of slot and generation; a stale pair here
        // could hand back a credential that was already rejected.
        let (state, generation) = self.store.snapshot()?;
        let session = match state {
            SessionState::SignedOut => return Err(AuthError::MissingCredential),
            SessionState::Active(session) => session,
        };

        if let Some(kind) = session.terminal_error() {
            return Err(AuthError::SessionExpired { kind });
        }

        if generation != failed_generation {
            // A renewal completed while this caller waited its turn.
            return Ok((session.tokens().access_token.clone(), generation));
        }

        if session.tokens().refresh_expired(Utc::now()) {
            warn!("refresh credential expired locally; ending session");
            self.store.mark_terminal_error(TerminalErrorKind::RefreshExpired)?;
            return Err(AuthError::SessionExpired {
                kind: TerminalErrorKind::RefreshExpired,
            });
        }

        match self.renewal.renew(&session.tokens().refresh_token).await {
            Ok(tokens) => {
                let access_token = tokens.access_token.clone();
                self.store.replace(session.renewed(tokens))?;
                let generation = self.store.generation();
                info!(generation, "access credential renewed");
                Ok((access_token, generation))
            },
            Err(RenewalError::Rejected { detail }) => {
                warn!(detail = %detail, "identity service rejected refresh credential");
                self.store.mark_terminal_error(TerminalErrorKind::RefreshRejected)?;
                Err(AuthError::SessionExpired {
                    kind: TerminalErrorKind::RefreshRejected,
                })
            },
            Err(RenewalError::Failed { message }) => Err(AuthError::Transient { message }),
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Scripted renewal endpoint for tests.
///
/// Responds from a queue of scripted results and counts how many renewal
/// calls actually went out, which is what the single-flight tests assert
/// on.
#[derive(Default)]
pub struct MockRenewalApi {
    calls: AtomicU64,
    script: std::sync::Mutex<Vec<Result<TokenSet, RenewalError>>>,
}

impl MockRenewalApi {
    /// Creates a mock with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a renewal result. Results are consumed in push order.
    pub fn push(&self, result: Result<TokenSet, RenewalError>) {
        self.script
            .lock()
            .expect("mock script lock")
            .push(result);
    }

    /// Returns how many renewal calls reached the mock.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenewalApi for MockRenewalApi {
    async fn renew(&self, _refresh_token: &SecretString) -> Result<TokenSet, RenewalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("mock script lock");
        if script.is_empty() {
            return Err(RenewalError::Failed {
                message: "mock script exhausted".to_string(),
            });
        }
        script.remove(0)
    }
}

impl std::fmt::Debug for MockRenewalApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRenewalApi")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}
