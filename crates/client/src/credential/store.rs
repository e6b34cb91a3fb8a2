// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory owner of the live credential pair.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::credential::persist::CredentialPersistence;
use crate::credential::{CredentialPair, StoredCredential, MAX_TOKEN_LIFETIME_SECS};

/// Holds the current credential pair and its expiry.
///
/// Writes replace the whole [`StoredCredential`] under the lock, so a reader
/// sees either the old pair or the new one, never a mix. Every write bumps a
/// generation counter read together with the pair.
pub struct CredentialStore {
    state: RwLock<StoreState>,
    persistence: Arc<dyn CredentialPersistence>,
}

#[derive(Default)]
struct StoreState {
    current: Option<StoredCredential>,
    generation: u64,
}

impl StoreState {
    fn replace(&mut self, current: Option<StoredCredential>) -> u64 {
        self.current = current;
        self.generation += 1;
        self.generation
    }
}

impl CredentialStore {
    pub fn new(persistence: Arc<dyn CredentialPersistence>) -> Self {
        Self { state: RwLock::new(StoreState::default()), persistence }
    }

    /// Store a new pair, computing `expires_at = now + lifetime_secs`.
    /// Lifetimes above [`MAX_TOKEN_LIFETIME_SECS`] are clamped.
    ///
    /// Overwrites any existing pair and returns the new generation. A failure
    /// to mirror into persistence is logged; the in-memory pair is set
    /// regardless.
    pub fn set(&self, pair: CredentialPair, lifetime_secs: u64) -> u64 {
        let now = SystemTime::now();
        let lifetime = Duration::from_secs(lifetime_secs.min(MAX_TOKEN_LIFETIME_SECS));
        let expires_at = now.checked_add(lifetime).unwrap_or(now);
        let expires_at_ms = to_epoch_ms(expires_at);
        let generation =
            self.state.write().replace(Some(StoredCredential { pair: pair.clone(), expires_at }));
        if let Err(e) = self.persistence.save(&pair, expires_at_ms) {
            warn!(err = %e, "failed to persist credentials");
        }
        debug!(lifetime_secs, generation, "credentials stored");
        generation
    }

    /// Current pair, or `None` when signed out.
    pub fn get(&self) -> Option<StoredCredential> {
        self.state.read().current.clone()
    }

    /// Current pair together with the generation it was written at.
    pub fn snapshot(&self) -> (Option<StoredCredential>, u64) {
        let state = self.state.read();
        (state.current.clone(), state.generation)
    }

    /// Number of writes (set, clear, restore) so far.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Whether a pair is present and `now < expires_at - margin`.
    pub fn is_valid(&self, margin: Duration) -> bool {
        self.is_valid_at(margin, SystemTime::now())
    }

    /// [`is_valid`](Self::is_valid) evaluated at an explicit instant.
    pub fn is_valid_at(&self, margin: Duration, now: SystemTime) -> bool {
        match self.state.read().current.as_ref() {
            Some(stored) => stored_is_valid(stored, margin, now),
            None => false,
        }
    }

    /// Remove the pair and erase the persisted mirror. Idempotent.
    pub fn clear(&self) {
        self.state.write().replace(None);
        if let Err(e) = self.persistence.erase() {
            warn!(err = %e, "failed to erase persisted credentials");
        }
        debug!("credentials cleared");
    }

    /// Rehydrate the pair from persistence. Returns whether a pair was loaded.
    ///
    /// An already-expired pair is still restored so its refresh token can be
    /// exchanged. Does not write back to persistence.
    pub fn restore(&self) -> bool {
        let record = match self.persistence.load() {
            Ok(Some(r)) => r,
            Ok(None) => return false,
            Err(e) => {
                warn!(err = %e, "failed to load persisted credentials");
                return false;
            }
        };
        // An unrepresentable expiry restores as already expired.
        let expires_at = UNIX_EPOCH
            .checked_add(Duration::from_millis(record.expires_at_ms))
            .unwrap_or(UNIX_EPOCH);
        self.state.write().replace(Some(StoredCredential { pair: record.pair, expires_at }));
        debug!(expires_at_ms = record.expires_at_ms, "restored persisted credentials");
        true
    }

    /// Expiry of the current pair as epoch millis.
    pub fn expires_at_epoch_ms(&self) -> Option<u64> {
        self.state.read().current.as_ref().map(|s| to_epoch_ms(s.expires_at))
    }
}

pub(crate) fn stored_is_valid(
    stored: &StoredCredential,
    margin: Duration,
    now: SystemTime,
) -> bool {
    match stored.expires_at.checked_sub(margin) {
        Some(deadline) => now < deadline,
        None => false,
    }
}

fn to_epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
