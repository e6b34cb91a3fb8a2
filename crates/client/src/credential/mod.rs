// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle: the live access/refresh pair, its persisted
//! mirror, the auth endpoint, and the manager that keeps the pair valid.
//!
//! The [`store::CredentialStore`] is the single owner of the pair. Only the
//! [`manager::CredentialManager`] writes to it; the request executor reads an
//! [`AccessToken`] snapshot per call.

pub mod auth;
pub mod claims;
pub mod manager;
pub mod persist;
pub mod store;

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Default safety margin before expiry at which a credential is refreshed.
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;

/// Longest token lifetime accepted from a grant (one year).
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

/// An access token paired with the refresh token that can replace it.
///
/// Both halves are always present together; absence is modelled as
/// `Option<CredentialPair>` by the store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: refresh_token.into() }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// A stored pair with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub pair: CredentialPair,
    pub expires_at: SystemTime,
}

/// A snapshot of the access token handed to one call.
///
/// Carries the store generation it was read from so a later authorization
/// failure can tell whether the credential has been replaced since.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    generation: u64,
}

impl AccessToken {
    pub(crate) fn new(secret: String, generation: u64) -> Self {
        Self { secret, generation }
    }

    pub fn as_str(&self) -> &str {
        &self.secret
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Who signed in, as reported by the password grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Events broadcast by the credential manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user: UserIdentity },
    /// A refresh exchange produced a new pair.
    Refreshed { expires_in_secs: u64 },
    /// A refresh exchange failed. The session layer decides whether to clear.
    RefreshFailed { error: String },
    SignedOut,
}

/// Resolve the state directory for persisted client data.
///
/// Checks `VEDU_STATE_DIR`, then `$XDG_STATE_HOME/vedu`,
/// then `$HOME/.local/state/vedu`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VEDU_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("vedu");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/vedu");
    }
    PathBuf::from(".vedu")
}

/// Default path of the persisted credential file.
pub fn default_credentials_path() -> PathBuf {
    state_dir().join("credentials.json")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
