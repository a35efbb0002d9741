//! Session endpoint payloads and the refresh exchange
//!
//! Login, registration and external-credential exchange all answer with a
//! `SessionGrant`: the user's profile plus a fresh credential pair. The
//! refresh endpoint answers with a `TokenPair`, which may omit the refresh
//! credential when the backend does not rotate it.
//!
//! `refresh_token` talks to the refresh endpoint directly instead of going
//! through the request executor: the executor is the one asking for the
//! refresh, and the refresh endpoint is excluded from its retry loop anyway.

use std::time::Duration;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

/// Body of the refresh exchange.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Response of the refresh exchange.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenPair {
    pub access: Secret<String>,
    /// Absent when the backend keeps the existing refresh credential
    #[serde(default)]
    pub refresh: Option<Secret<String>>,
}

impl TokenPair {
    /// Build the pair to store, keeping `previous_refresh` when the response
    /// did not rotate it.
    pub fn into_credentials(self, previous_refresh: Option<Secret<String>>) -> CredentialPair {
        let refresh = self
            .refresh
            .filter(|r| !r.is_empty())
            .or(previous_refresh);
        CredentialPair {
            access: self.access,
            refresh,
        }
    }
}

/// Response of every session-establishing call.
#[derive(Debug, Deserialize)]
pub struct SessionGrant<S> {
    /// Profile of the authenticated user
    #[serde(alias = "user")]
    pub session: S,
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

impl<S> SessionGrant<S> {
    /// Split into the profile and the credential pair to store.
    pub fn into_parts(self) -> (S, CredentialPair) {
        (
            self.session,
            CredentialPair {
                access: self.access,
                refresh: Some(self.refresh),
            },
        )
    }
}

/// Email/password login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: Secret<String>,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
        }
    }
}

/// Account registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: Secret<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A credential issued by a third-party identity provider (e.g. an ID token),
/// exchanged for a session.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalCredential {
    pub provider: String,
    pub credential: Secret<String>,
}

/// Exchange a refresh credential for a new pair.
///
/// `url` is the absolute refresh endpoint. The request carries its own
/// `timeout`. A 401/403 means the refresh credential itself is no longer
/// accepted.
pub async fn refresh_token(
    client: &reqwest::Client,
    url: &reqwest::Url,
    refresh: &str,
    timeout: Duration,
) -> Result<TokenPair> {
    let response = client
        .post(url.clone())
        .timeout(timeout)
        .json(&RefreshRequest { refresh })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh credential rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    let pair = response
        .json::<TokenPair>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))?;

    if pair.access.is_empty() {
        return Err(Error::TokenExchange(
            "refresh response carried an empty access credential".into(),
        ));
    }

    debug!(rotated = pair.refresh.is_some(), "refresh exchange succeeded");
    Ok(pair)
}
