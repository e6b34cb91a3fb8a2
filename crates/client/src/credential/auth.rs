// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication endpoint: password grant, refresh grant, sign-up.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::api::Backend;
use crate::credential::{CredentialPair, UserIdentity, MAX_TOKEN_LIFETIME_SECS};
use crate::error::{extract_message, ApiError, GrantFailure};

/// Token grant returned by both the password and refresh exchanges.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    #[serde(default)]
    pub user: Option<GrantUser>,
}

/// User object embedded in a grant.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
}

impl TokenGrant {
    pub fn pair(&self) -> CredentialPair {
        CredentialPair::new(self.access_token.clone(), self.refresh_token.clone())
    }

    /// Identity of the signed-in user. The display name falls back to the
    /// local part of the email when no `user_metadata.name` is set.
    pub fn identity(&self) -> Option<UserIdentity> {
        let user = self.user.as_ref()?;
        let email = user.email.clone().unwrap_or_default();
        let name = user
            .user_metadata
            .as_ref()
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_owned());
        Some(UserIdentity { id: user.id.clone(), email, name })
    }
}

/// Client for the backend's `/auth/v1` endpoints.
#[derive(Debug, Clone)]
pub struct AuthEndpoint {
    http: reqwest::Client,
    backend: Backend,
}

impl AuthEndpoint {
    pub fn new(http: reqwest::Client, backend: Backend) -> Self {
        Self { http, backend }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Exchange email and password for a fresh pair.
    pub async fn password_grant(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenGrant, GrantFailure> {
        self.grant("password", json!({ "email": email, "password": password })).await
    }

    /// Exchange a refresh token for a fresh pair. The old refresh token is
    /// spent by this call whether or not the caller keeps the result.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, GrantFailure> {
        self.grant("refresh_token", json!({ "refresh_token": refresh_token })).await
    }

    async fn grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<TokenGrant, GrantFailure> {
        let mut url = self
            .backend
            .url("auth/v1/token")
            .map_err(|e| GrantFailure::Transport(e.to_string()))?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let resp = self
            .http
            .post(url)
            .header("apikey", self.backend.api_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| GrantFailure::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GrantFailure::Transport(format!("read body: {e}")))?;
        debug!(grant_type, status = status.as_u16(), "token grant response");

        if !status.is_success() {
            return Err(GrantFailure::Rejected {
                status: status.as_u16(),
                message: extract_message(status.as_u16(), &bytes),
            });
        }

        let grant = serde_json::from_slice::<TokenGrant>(&bytes).map_err(|e| {
            GrantFailure::InvalidResponse(format!(
                "{e}: {}",
                extract_message(status.as_u16(), &bytes)
            ))
        })?;
        if grant.expires_in > MAX_TOKEN_LIFETIME_SECS {
            return Err(GrantFailure::InvalidResponse(format!(
                "expires_in {} exceeds {MAX_TOKEN_LIFETIME_SECS}s",
                grant.expires_in
            )));
        }
        Ok(grant)
    }

    /// Create an account. Returns the backend's user record.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<serde_json::Value, ApiError> {
        let url = self.backend.url("auth/v1/signup")?;
        let body = json!({ "email": email, "password": password, "data": { "name": name } });
        let resp = self
            .http
            .post(url)
            .header("apikey", self.backend.api_key())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(ApiError::Remote {
                status: status.as_u16(),
                message: extract_message(status.as_u16(), &bytes),
            });
        }
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| err.to_string());
            return Err(ApiError::Remote { status: status.as_u16(), message });
        }
        Ok(value)
    }
}
