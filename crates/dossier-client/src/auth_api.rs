//! Identity service endpoints: sign-in and credential renewal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dossier_core::{Principal, RenewalApi, RenewalError, RoleSet, Session, TokenSet};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::client::{ClientConfig, ClientError};
use crate::http::{build_http_client, join_url};

/// Error body code the identity service uses for a dead refresh
/// credential. Recognizing it turns a generic failure into immediate
/// terminal handling.
const REFRESH_EXPIRED_CODE: &str = "REFRESH_EXPIRED";

/// Errors from signing in.
#[derive(Debug, thiserror::Error)]
pub enum SignInError {
    /// The identity service refused the username/password pair.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The sign-in call failed (connectivity, service outage).
    #[error("sign-in failed: {message}")]
    Failed {
        /// Failure description.
        message: String,
    },

    /// The service answered success but the payload did not decode.
    #[error("unexpected sign-in payload: {message}")]
    Payload {
        /// Decode failure description.
        message: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewalRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    access_token: String,
    access_expires_at: DateTime<Utc>,
    refresh_token: String,
    refresh_expires_at: DateTime<Utc>,
}

impl From<TokenPayload> for TokenSet {
    fn from(payload: TokenPayload) -> Self {
        Self {
            access_token: SecretString::from(payload.access_token),
            access_expires_at: payload.access_expires_at,
            refresh_token: SecretString::from(payload.refresh_token),
            refresh_expires_at: payload.refresh_expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    id: String,
    roles: RoleSet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    #[serde(flatten)]
    tokens: TokenPayload,
    user: UserPayload,
}

/// Client for the identity service.
///
/// Sign-in mints the initial session; renewal exchanges the refresh
/// credential for a fresh token pair on behalf of the refresh
/// coordinator.
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Builds an identity client from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying HTTP client cannot
    /// be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = build_http_client(config.connect_timeout, config.request_timeout)?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Exchanges a username/password pair for an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`SignInError::InvalidCredentials`] when the service
    /// refuses the pair, [`SignInError::Failed`] for other failures.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session, SignInError> {
        let response = self
            .client
            .post(join_url(&self.base_url, "/auth/sign-in"))
            .json(&SignInRequest { username, password })
            .send()
            .await
            .map_err(|e| SignInError::Failed {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(SignInError::InvalidCredentials);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read sign-in response body".to_string());
            return Err(SignInError::Failed { message });
        }

        let payload: SignInResponse =
            response.json().await.map_err(|e| SignInError::Payload {
                message: e.to_string(),
            })?;

        info!(user_id = %payload.user.id, "signed in");
        Ok(session_from_payload(payload))
    }
}

#[async_trait]
impl RenewalApi for HttpAuthApi {
    async fn renew(&self, refresh_token: &SecretString) -> Result<TokenSet, RenewalError> {
        let response = self
            .client
            .post(join_url(&self.base_url, "/auth/renew"))
            .json(&RenewalRequest {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| RenewalError::Failed {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            let payload: TokenPayload =
                response.json().await.map_err(|e| RenewalError::Failed {
                    message: e.to_string(),
                })?;
            return Ok(payload.into());
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        Err(classify_renewal_failure(status, &body))
    }
}

impl std::fmt::Debug for HttpAuthApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn session_from_payload(payload: SignInResponse) -> Session {
    Session::new(
        Principal::new(payload.user.id, payload.user.roles),
        payload.tokens.into(),
    )
}

/// Maps a non-2xx renewal response onto the renewal error taxonomy.
///
/// A 401, or any body carrying the service's refresh-expired code, means
/// the refresh credential is dead and the session is over. Everything
/// else stays generic so the caller may retry later.
fn classify_renewal_failure(status: u16, body: &Value) -> RenewalError {
    let code = body.get("code").and_then(Value::as_str);
    let detail = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("refresh credential rejected")
        .to_string();

    if status == 401 || code == Some(REFRESH_EXPIRED_CODE) {
        return RenewalError::Rejected { detail };
    }

    RenewalError::Failed {
        message: format!("renewal endpoint answered status {status}: {detail}"),
    }
}
