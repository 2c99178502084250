//! Authentication and session error taxonomy.
//!
//! Each variant is handled by exactly one layer: missing credentials and
//! expired sessions end at the watchdog's forced sign-out, transient
//! failures and application errors propagate to the caller for
//! user-visible reporting. Nothing is both retried automatically and
//! surfaced.

use thiserror::Error;

use crate::credentials::{CredentialStoreError, TerminalErrorKind};

/// Errors from the authenticated request path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No credential is present; the user is signed out.
    #[error("no credential present: sign in first")]
    MissingCredential,

    /// The session cannot be renewed. Terminal: the watchdog will force a
    /// sign-out.
    #[error("session expired: {kind}")]
    SessionExpired {
        /// Why the session became unrecoverable.
        kind: TerminalErrorKind,
    },

    /// Connectivity failure. Safe for the caller to retry manually; never
    /// retried automatically.
    #[error("transient network failure: {message}")]
    Transient {
        /// Transport-level failure description.
        message: String,
    },

    /// The service answered with a non-authorization error status. Passed
    /// through to the caller untouched.
    #[error("service error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The credential store failed internally.
    #[error(transparent)]
    Store(#[from] CredentialStoreError),
}

impl AuthError {
    /// Returns `true` if the error ends the session (watchdog territory).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_session_expiry_is_terminal() {
        assert!(
            AuthError::SessionExpired {
                kind: TerminalErrorKind::RefreshExpired,
            }
            .is_terminal()
        );
        assert!(!AuthError::MissingCredential.is_terminal());
        assert!(
            !AuthError::Transient {
                message: "connection reset".to_string(),
            }
            .is_terminal()
        );
        assert!(
            !AuthError::Api {
                status: 422,
                message: "invalid payload".to_string(),
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_display_includes_terminal_kind() {
        let err = AuthError::SessionExpired {
            kind: TerminalErrorKind::RefreshRejected,
        };
        assert!(err.to_string().contains("REFRESH_REJECTED"));
    }
}
