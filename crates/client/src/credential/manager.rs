// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle manager: hands out access tokens that are valid for
//! at least the safety margin, refreshing at most once per expiry event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::credential::auth::AuthEndpoint;
use crate::credential::store::{stored_is_valid, CredentialStore};
use crate::credential::{claims, AccessToken, SessionEvent, UserIdentity};
use crate::error::{AuthError, GrantFailure};

/// Outcome of the most recent refresh exchange, shared with every caller
/// that was queued behind it.
#[derive(Default)]
struct RefreshSlot {
    last: Option<Result<AccessToken, AuthError>>,
    /// Store generation right after the exchange. The outcome is stale once
    /// a sign-in or sign-out has written past it.
    generation: u64,
}

/// Why a caller wants a refresh.
enum RefreshCause {
    /// `ensure_valid` found the stored token inside the margin window.
    Stale,
    /// The backend rejected a token issued at this store generation.
    Rejected(u64),
    /// Unconditional.
    Forced,
}

/// Single writer of the [`CredentialStore`].
///
/// All store writes happen while holding `gate`, so a refresh exchange can
/// never interleave with a sign-in or sign-out.
pub struct CredentialManager {
    store: Arc<CredentialStore>,
    auth: AuthEndpoint,
    margin: Duration,
    gate: Arc<Mutex<RefreshSlot>>,
    /// Number of refresh exchanges finished, successful or not.
    exchanges: AtomicU64,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CredentialManager {
    pub fn new(store: Arc<CredentialStore>, auth: AuthEndpoint, margin: Duration) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            store,
            auth,
            margin,
            gate: Arc::new(Mutex::new(RefreshSlot::default())),
            exchanges: AtomicU64::new(0),
            event_tx,
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn auth(&self) -> &AuthEndpoint {
        &self.auth
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Receive session events. Events sent with no receivers are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Return an access token valid for at least the margin, refreshing if
    /// the stored one is inside the margin window.
    pub async fn ensure_valid(self: &Arc<Self>) -> Result<AccessToken, AuthError> {
        let seen = self.exchanges.load(Ordering::SeqCst);
        let (stored, generation) = self.store.snapshot();
        let Some(stored) = stored else {
            return Err(AuthError::NoCredential);
        };
        if stored_is_valid(&stored, self.margin, SystemTime::now()) {
            return Ok(AccessToken::new(stored.pair.access_token, generation));
        }
        debug!("access token inside refresh margin");
        self.refresh(seen, RefreshCause::Stale).await
    }

    /// Refresh regardless of local expiry.
    pub async fn force_refresh(self: &Arc<Self>) -> Result<AccessToken, AuthError> {
        let seen = self.exchanges.load(Ordering::SeqCst);
        self.refresh(seen, RefreshCause::Forced).await
    }

    /// Refresh after the backend rejected `token`.
    ///
    /// When the store has moved past the rejected token (another caller
    /// already refreshed, or a new sign-in happened) the current token is
    /// returned without a second exchange.
    pub async fn refresh_rejected(
        self: &Arc<Self>,
        token: &AccessToken,
    ) -> Result<AccessToken, AuthError> {
        let seen = self.exchanges.load(Ordering::SeqCst);
        self.refresh(seen, RefreshCause::Rejected(token.generation())).await
    }

    async fn refresh(
        self: &Arc<Self>,
        seen: u64,
        cause: RefreshCause,
    ) -> Result<AccessToken, AuthError> {
        let slot = Arc::clone(&self.gate).lock_owned().await;

        let (stored, generation) = self.store.snapshot();

        // An exchange finished while we queued: its outcome is ours too,
        // unless the store has been written since.
        let moved = self.exchanges.load(Ordering::SeqCst) != seen;
        if moved && slot.generation == generation {
            if let Some(outcome) = slot.last.clone() {
                debug!(ok = outcome.is_ok(), "reusing concurrent refresh outcome");
                return outcome;
            }
        }

        let Some(stored) = stored else {
            return Err(AuthError::NoCredential);
        };
        let valid = stored_is_valid(&stored, self.margin, SystemTime::now());
        let current = match cause {
            RefreshCause::Stale => valid,
            RefreshCause::Rejected(rejected) => rejected != generation,
            RefreshCause::Forced => moved && valid,
        };
        if current {
            return Ok(AccessToken::new(stored.pair.access_token, generation));
        }

        // The exchange owns the guard so dropping this future cannot abort
        // it halfway and spend the refresh token without storing the result.
        let manager = Arc::clone(self);
        let refresh_token = stored.pair.refresh_token;
        let task = tokio::spawn(async move {
            let mut slot = slot;
            let outcome = manager.exchange(&refresh_token).await;
            slot.generation = match &outcome {
                Ok(token) => token.generation(),
                Err(_) => generation,
            };
            slot.last = Some(outcome.clone());
            manager.exchanges.fetch_add(1, Ordering::SeqCst);
            outcome
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(AuthError::RefreshFailed(GrantFailure::Transport(format!(
                "refresh task failed: {e}"
            )))),
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        match self.auth.refresh_grant(refresh_token).await {
            Ok(grant) => {
                let generation = self.store.set(grant.pair(), grant.expires_in);
                info!(expires_in = grant.expires_in, "credential refreshed");
                let _ = self.event_tx.send(SessionEvent::Refreshed {
                    expires_in_secs: grant.expires_in,
                });
                Ok(AccessToken::new(grant.access_token, generation))
            }
            Err(e) => {
                warn!(err = %e, "credential refresh failed");
                let _ = self.event_tx.send(SessionEvent::RefreshFailed { error: e.to_string() });
                Err(AuthError::RefreshFailed(e))
            }
        }
    }

    /// Password grant. On success the new pair replaces whatever was stored.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let grant =
            self.auth.password_grant(email, password).await.map_err(AuthError::SignInFailed)?;

        let user = grant.identity().unwrap_or_else(|| UserIdentity {
            id: claims::subject(&grant.access_token).unwrap_or_default(),
            email: email.to_owned(),
            name: email.split('@').next().unwrap_or_default().to_owned(),
        });

        {
            let _slot = self.gate.lock().await;
            self.store.set(grant.pair(), grant.expires_in);
        }
        info!(user_id = %user.id, expires_in = grant.expires_in, "signed in");
        let _ = self.event_tx.send(SessionEvent::SignedIn { user: user.clone() });
        Ok(user)
    }

    /// Drop the local session. Waits for an in-flight refresh so it cannot
    /// write the pair back afterwards.
    pub async fn sign_out(&self) {
        {
            let _slot = self.gate.lock().await;
            self.store.clear();
        }
        info!("signed out");
        let _ = self.event_tx.send(SessionEvent::SignedOut);
    }

    /// Rehydrate the persisted pair at start-up.
    pub async fn restore(&self) -> bool {
        let _slot = self.gate.lock().await;
        self.store.restore()
    }

    /// User id (`sub` claim) of the stored access token.
    pub fn user_id(&self) -> Option<String> {
        self.store.get().and_then(|s| claims::subject(&s.pair.access_token))
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
