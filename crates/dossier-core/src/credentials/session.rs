//! Session state types.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::permissions::RoleSet;

/// The authenticated user behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Service-assigned user identifier.
    pub user_id: String,
    /// Roles held by the user.
    pub roles: RoleSet,
}

impl Principal {
    /// Creates a principal.
    #[must_use]
    pub fn new(user_id: impl Into<String>, roles: RoleSet) -> Self {
        Self {
            user_id: user_id.into(),
            roles,
        }
    }
}

/// An unrecoverable session failure.
///
/// Once recorded on the session, no automatic renewal is attempted again;
/// the watchdog forces a sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalErrorKind {
    /// The refresh credential passed its expiry before renewal.
    RefreshExpired,
    /// The renewal endpoint rejected the refresh credential.
    RefreshRejected,
    /// The service rejected an access credential that had just been
    /// renewed.
    CredentialRejected,
}

impl TerminalErrorKind {
    /// Returns the kind as a stable string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RefreshExpired => "REFRESH_EXPIRED",
            Self::RefreshRejected => "REFRESH_REJECTED",
            Self::CredentialRejected => "CREDENTIAL_REJECTED",
        }
    }
}

impl std::fmt::Display for TerminalErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An access/refresh token pair with expiries, as minted by the identity
/// service on sign-in or renewal.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Short-lived credential attached to individual requests.
    pub access_token: SecretString,
    /// When the access credential stops being accepted.
    pub access_expires_at: DateTime<Utc>,
    /// Longer-lived credential used solely to mint a new access credential.
    pub refresh_token: SecretString,
    /// When the refresh credential stops being accepted.
    pub refresh_expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Returns `true` if the access credential is expired at `now`.
    #[must_use]
    pub fn access_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at <= now
    }

    /// Returns `true` if the refresh credential is expired at `now`.
    #[must_use]
    pub fn refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at <= now
    }
}

/// A live authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    principal: Principal,
    tokens: TokenSet,
    terminal_error: Option<TerminalErrorKind>,
}

impl Session {
    /// Creates a session from a sign-in result.
    #[must_use]
    pub const fn new(principal: Principal, tokens: TokenSet) -> Self {
        Self {
            principal,
            tokens,
            terminal_error: None,
        }
    }

    /// Returns the session with `tokens` swapped in.
    ///
    /// The principal carries over unchanged; renewal mints tokens only.
    /// Any terminal flag is dropped, since a successful renewal proves the
    /// session recovered before the flag was acted upon.
    #[must_use]
    pub fn renewed(&self, tokens: TokenSet) -> Self {
        Self {
            principal: self.principal.clone(),
            tokens,
            terminal_error: None,
        }
    }

    /// Returns the session with the terminal flag set.
    ///
    /// The first recorded kind wins; a later failure never overwrites it.
    #[must_use]
    pub fn with_terminal_error(&self, kind: TerminalErrorKind) -> Self {
        Self {
            principal: self.principal.clone(),
            tokens: self.tokens.clone(),
            terminal_error: Some(self.terminal_error.unwrap_or(kind)),
        }
    }

    /// Returns the authenticated principal.
    #[must_use]
    pub const fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Returns the token pair.
    #[must_use]
    pub const fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    /// Returns the terminal flag, if one is recorded.
    #[must_use]
    pub const fn terminal_error(&self) -> Option<TerminalErrorKind> {
        self.terminal_error
    }

    /// Builds the storable form of this session, exposing token material.
    ///
    /// Only the persistence boundary should call this. The terminal flag is
    /// not persisted: a failed session is not worth restoring, and a stale
    /// flag would force a sign-out before the first renewal attempt.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            user_id: self.principal.user_id.clone(),
            roles: self.principal.roles.clone(),
            access_token: self.tokens.access_token.expose_secret().to_string(),
            access_expires_at: self.tokens.access_expires_at,
            refresh_token: self.tokens.refresh_token.expose_secret().to_string(),
            refresh_expires_at: self.tokens.refresh_expires_at,
        }
    }

    /// Rebuilds a session from its storable form.
    #[must_use]
    pub fn from_persisted(persisted: PersistedSession) -> Self {
        Self::new(
            Principal {
                user_id: persisted.user_id,
                roles: persisted.roles,
            },
            TokenSet {
                access_token: SecretString::from(persisted.access_token),
                access_expires_at: persisted.access_expires_at,
                refresh_token: SecretString::from(persisted.refresh_token),
                refresh_expires_at: persisted.refresh_expires_at,
            },
        )
    }
}

/// Contents of the session slot.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    /// No principal is authenticated.
    #[default]
    SignedOut,
    /// A principal is authenticated.
    Active(Session),
}

impl SessionState {
    /// Returns `true` if a principal is authenticated.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Returns the active session, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedOut => None,
            Self::Active(session) => Some(session),
        }
    }

    /// Returns the state name for error messages.
    #[must_use]
    pub const fn state_name(&self) -> &'static str {
        match self {
            Self::SignedOut => "SignedOut",
            Self::Active(_) => "Active",
        }
    }
}

/// The serialized form a session takes at the persistence boundary.
///
/// Token material is stored in the clear inside this structure; the
/// storage backend (OS keyring) is what protects it at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    /// Service-assigned user identifier.
    pub user_id: String,
    /// Roles held by the user.
    pub roles: RoleSet,
    /// Access token in the clear.
    pub access_token: String,
    /// Access token expiry.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token in the clear.
    pub refresh_token: String,
    /// Refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::permissions::Role;

    fn sample_session(now: DateTime<Utc>) -> Session {
        Session::new(
            Principal::new("u1", RoleSet::from([Role::Advisor])),
            TokenSet {
                access_token: SecretString::from("access-1"),
                access_expires_at: now + Duration::minutes(15),
                refresh_token: SecretString::from("refresh-1"),
                refresh_expires_at: now + Duration::days(7),
            },
        )
    }

    #[test]
    fn test_renewal_carries_principal_and_clears_flag() {
        let now = Utc::now();
        let session = sample_session(now).with_terminal_error(TerminalErrorKind::RefreshExpired);

        let renewed = session.renewed(TokenSet {
            access_token: SecretString::from("access-2"),
            access_expires_at: now + Duration::minutes(15),
            refresh_token: SecretString::from("refresh-2"),
            refresh_expires_at: now + Duration::days(7),
        });

        assert_eq!(renewed.principal().user_id, "u1");
        assert!(renewed.terminal_error().is_none());
        assert_eq!(renewed.tokens().access_token.expose_secret(), "access-2");
    }

    #[test]
    fn test_first_terminal_kind_wins() {
        let session = sample_session(Utc::now())
            .with_terminal_error(TerminalErrorKind::RefreshRejected)
            .with_terminal_error(TerminalErrorKind::CredentialRejected);

        assert_eq!(
            session.terminal_error(),
            Some(TerminalErrorKind::RefreshRejected)
        );
    }

    #[test]
    fn test_expiry_checks() {
        let now = Utc::now();
        let session = sample_session(now);

        assert!(!session.tokens().access_expired(now));
        assert!(session.tokens().access_expired(now + Duration::minutes(16)));
        assert!(!session.tokens().refresh_expired(now + Duration::days(6)));
        assert!(session.tokens().refresh_expired(now + Duration::days(8)));
    }

    #[test]
    fn test_persisted_round_trip() {
        let now = Utc::now();
        let session = sample_session(now);

        let restored = Session::from_persisted(session.to_persisted());

        assert_eq!(restored.principal(), session.principal());
        assert_eq!(
            restored.tokens().access_token.expose_secret(),
            session.tokens().access_token.expose_secret()
        );
        assert_eq!(
            restored.tokens().refresh_expires_at,
            session.tokens().refresh_expires_at
        );
        assert!(restored.terminal_error().is_none());
    }

    #[test]
    fn test_debug_output_redacts_tokens() {
        let session = sample_session(Utc::now());
        let debug = format!("{session:?}");
        assert!(!debug.contains("access-1"));
        assert!(!debug.contains("refresh-1"));
    }
}
