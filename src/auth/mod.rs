//! Authentication token handling.
//!
//! Holds the current bearer token and its expiry, refreshing it through the
//! active handler's token endpoint when the remaining lifetime drops below the
//! configured buffer. Concurrent callers coalesce onto a single in-flight
//! refresh: the first caller through the gate performs the network exchange,
//! everyone else waits on the gate and then reads the fresh token.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::AuthCredentials;
use crate::error::ClientError;
use crate::execution::status::describe;
use crate::handlers::{ApiHandler, AuthMethod};

/// A bearer token and its expiry instant. Replaced atomically as a whole;
/// never logged.
#[derive(Clone)]
pub struct AuthToken {
    secret: SecretString,
    expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: SecretString::new(token.into()),
            expires_at,
        }
    }

    /// Whether the token's remaining lifetime exceeds the refresh buffer.
    fn is_fresh(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        let remaining = self.expires_at - now;
        remaining
            .to_std()
            .map(|remaining| remaining > buffer)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint response. Field names vary across vendors; aliases cover
/// the common spellings.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(alias = "expires")]
    expires_in: i64,
}

/// Owns the cached token and the single-flight refresh gate.
pub struct TokenHandler {
    token: std::sync::RwLock<Option<AuthToken>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl TokenHandler {
    pub fn new() -> Self {
        Self {
            token: std::sync::RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Ensure a usable credential exists for the handler's auth method,
    /// refreshing the bearer token when it is missing or inside the buffer
    /// window. At most one network refresh is in flight at a time.
    pub async fn ensure_valid(
        &self,
        handler: &dyn ApiHandler,
        http: &reqwest::Client,
        credentials: &AuthCredentials,
        buffer: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        match handler.auth_method() {
            AuthMethod::BasicCredentials => {
                if credentials.has_basic_credentials() {
                    Ok(())
                } else {
                    Err(ClientError::Auth(
                        "basic auth requires both username and password".to_string(),
                    ))
                }
            }
            AuthMethod::BearerOAuth => {
                if self.cached_is_fresh(buffer) {
                    return Ok(());
                }

                let _gate = tokio::select! {
                    _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                    guard = self.refresh_gate.lock() => guard,
                };
                // A coalesced waiter finds the token another caller fetched.
                if self.cached_is_fresh(buffer) {
                    return Ok(());
                }

                let token = fetch_token(handler, http, credentials, cancel).await?;
                if let Ok(mut guard) = self.token.write() {
                    *guard = Some(token);
                }
                tracing::debug!(target: "manifold::auth", "bearer token refreshed");
                Ok(())
            }
        }
    }

    /// Drop the cached token so the next [`ensure_valid`](Self::ensure_valid)
    /// must refresh. Used after an auth-expired response.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    /// The `Authorization` header value for the handler's auth method.
    pub fn authorization_header(
        &self,
        method: AuthMethod,
        credentials: &AuthCredentials,
    ) -> Result<String, ClientError> {
        match method {
            AuthMethod::BearerOAuth => {
                let guard = self
                    .token
                    .read()
                    .map_err(|_| ClientError::Auth("token store poisoned".to_string()))?;
                let token = guard
                    .as_ref()
                    .ok_or_else(|| ClientError::Auth("no bearer token available".to_string()))?;
                Ok(format!("Bearer {}", token.secret.expose_secret()))
            }
            AuthMethod::BasicCredentials => {
                let username = credentials.username.as_deref().ok_or_else(|| {
                    ClientError::Auth("basic auth requires a username".to_string())
                })?;
                let password = credentials.password.as_ref().ok_or_else(|| {
                    ClientError::Auth("basic auth requires a password".to_string())
                })?;
                let encoded =
                    BASE64.encode(format!("{username}:{}", password.expose_secret()));
                Ok(format!("Basic {encoded}"))
            }
        }
    }

    fn cached_is_fresh(&self, buffer: Duration) -> bool {
        let now = Utc::now();
        self.token
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|t| t.is_fresh(buffer, now)))
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn set_token(&self, token: AuthToken) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token);
        }
    }
}

impl Default for TokenHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Exchange client credentials for a bearer token at the handler's auth
/// endpoint.
async fn fetch_token(
    handler: &dyn ApiHandler,
    http: &reqwest::Client,
    credentials: &AuthCredentials,
    cancel: &CancellationToken,
) -> Result<AuthToken, ClientError> {
    let url = handler.auth_endpoint();
    tracing::debug!(target: "manifold::auth", url = %url, "requesting bearer token");

    let request = http.post(&url).form(&[
        ("grant_type", "client_credentials"),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret_value()),
    ]);

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        result = request.send() => result?,
    };

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ClientError::Auth(format!(
            "token endpoint rejected credentials: {}",
            describe(status)
        )));
    }
    if status.is_server_error() {
        return Err(ClientError::Transport(format!(
            "token endpoint unavailable: {}",
            describe(status)
        )));
    }
    if !status.is_success() {
        return Err(ClientError::Auth(format!(
            "token endpoint returned {}",
            describe(status)
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| ClientError::Parse(format!("failed to parse token response: {e}")))?;

    Ok(AuthToken::new(
        token.access_token,
        Utc::now() + chrono::Duration::seconds(token.expires_in),
    ))
}
