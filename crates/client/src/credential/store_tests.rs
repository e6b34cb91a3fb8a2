// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use proptest::prelude::*;

use super::*;
use crate::credential::persist::{MemoryPersistence, NoPersistence, PersistedCredential};

fn memory_store() -> (CredentialStore, Arc<MemoryPersistence>) {
    let mem = Arc::new(MemoryPersistence::new());
    (CredentialStore::new(Arc::clone(&mem) as Arc<dyn CredentialPersistence>), mem)
}

fn expires_at(store: &CredentialStore) -> anyhow::Result<SystemTime> {
    store.get().map(|s| s.expires_at).ok_or_else(|| anyhow::anyhow!("store is empty"))
}

#[test]
fn empty_store_is_absent_and_invalid() {
    let store = CredentialStore::new(Arc::new(NoPersistence));
    assert!(store.get().is_none());
    assert!(!store.is_valid(Duration::ZERO));
    assert_eq!(store.expires_at_epoch_ms(), None);
}

#[test]
fn set_computes_expiry_from_lifetime() -> anyhow::Result<()> {
    let (store, _) = memory_store();
    let before = SystemTime::now();
    store.set(CredentialPair::new("a", "r"), 3600);
    let after = SystemTime::now();

    let at = expires_at(&store)?;
    assert!(at >= before + Duration::from_secs(3600));
    assert!(at <= after + Duration::from_secs(3600));
    Ok(())
}

#[test]
fn oversized_lifetime_is_clamped() -> anyhow::Result<()> {
    let (store, mem) = memory_store();
    let before = SystemTime::now();
    store.set(CredentialPair::new("a", "r"), u64::MAX);
    let after = SystemTime::now();

    let at = expires_at(&store)?;
    let cap = Duration::from_secs(MAX_TOKEN_LIFETIME_SECS);
    assert!(at >= before + cap);
    assert!(at <= after + cap);
    assert!(store.is_valid(Duration::from_secs(60)));
    assert_eq!(mem.save_count(), 1);
    Ok(())
}

#[test]
fn set_overwrites_and_mirrors_to_persistence() -> anyhow::Result<()> {
    let (store, mem) = memory_store();
    store.set(CredentialPair::new("a1", "r1"), 60);
    store.set(CredentialPair::new("a2", "r2"), 120);

    let stored = store.get().ok_or_else(|| anyhow::anyhow!("store is empty"))?;
    assert_eq!(stored.pair, CredentialPair::new("a2", "r2"));
    assert_eq!(mem.save_count(), 2);

    let persisted = mem.snapshot().ok_or_else(|| anyhow::anyhow!("nothing persisted"))?;
    assert_eq!(persisted.pair, stored.pair);
    assert_eq!(Some(persisted.expires_at_ms), store.expires_at_epoch_ms());
    Ok(())
}

#[test]
fn clear_is_idempotent() {
    let (store, mem) = memory_store();
    store.set(CredentialPair::new("a", "r"), 60);

    store.clear();
    assert!(store.get().is_none());
    store.clear();
    assert!(store.get().is_none());

    assert_eq!(mem.erase_count(), 2);
    assert!(mem.snapshot().is_none());
}

#[test]
fn every_write_bumps_generation() {
    let (store, _) = memory_store();
    assert_eq!(store.generation(), 0);
    let first = store.set(CredentialPair::new("a1", "r1"), 60);
    let second = store.set(CredentialPair::new("a2", "r2"), 60);
    assert!(second > first);

    store.clear();
    let (current, generation) = store.snapshot();
    assert!(current.is_none());
    assert!(generation > second);
}

#[test]
fn lifetime_margin_only_invalidates_final_minute() -> anyhow::Result<()> {
    let (store, _) = memory_store();
    let margin = Duration::from_secs(60);
    store.set(CredentialPair::new("a", "r"), 3600);
    let at = expires_at(&store)?;
    let issued = at - Duration::from_secs(3600);

    assert!(store.is_valid_at(margin, issued + Duration::from_secs(1)));
    assert!(store.is_valid_at(margin, issued + Duration::from_secs(3539)));
    assert!(!store.is_valid_at(margin, issued + Duration::from_secs(3540)));
    assert!(!store.is_valid_at(margin, issued + Duration::from_secs(3600)));
    Ok(())
}

#[test]
fn lifetime_shorter_than_margin_is_never_valid() {
    let (store, _) = memory_store();
    store.set(CredentialPair::new("a", "r"), 30);
    assert!(!store.is_valid(Duration::from_secs(60)));
}

#[test]
fn restore_rehydrates_without_rewriting() -> anyhow::Result<()> {
    let record = PersistedCredential {
        pair: CredentialPair::new("persisted-a", "persisted-r"),
        expires_at_ms: crate::epoch_ms() + 600_000,
    };
    let mem = Arc::new(MemoryPersistence::with_record(record.clone()));
    let store = CredentialStore::new(Arc::clone(&mem) as Arc<dyn CredentialPersistence>);

    assert!(store.restore());
    let stored = store.get().ok_or_else(|| anyhow::anyhow!("store is empty"))?;
    assert_eq!(stored.pair, record.pair);
    assert_eq!(store.expires_at_epoch_ms(), Some(record.expires_at_ms));
    assert!(store.is_valid(Duration::from_secs(60)));
    assert_eq!(mem.save_count(), 0);
    Ok(())
}

#[test]
fn restore_keeps_expired_pair_for_refresh() {
    let record = PersistedCredential {
        pair: CredentialPair::new("old-a", "old-r"),
        expires_at_ms: 1_000,
    };
    let store = CredentialStore::new(Arc::new(MemoryPersistence::with_record(record)));
    assert!(store.restore());
    assert!(store.get().is_some());
    assert!(!store.is_valid(Duration::ZERO));
}

#[test]
fn restore_accepts_any_persisted_expiry() {
    let record = PersistedCredential {
        pair: CredentialPair::new("odd-a", "odd-r"),
        expires_at_ms: u64::MAX,
    };
    let store = CredentialStore::new(Arc::new(MemoryPersistence::with_record(record)));
    assert!(store.restore());
    assert!(store.get().is_some());
}

#[test]
fn restore_from_empty_persistence_is_noop() {
    let store = CredentialStore::new(Arc::new(NoPersistence));
    assert!(!store.restore());
    assert!(store.get().is_none());
}

proptest! {
    #[test]
    fn validity_flips_exactly_at_margin(
        lifetime in 0u64..1_000_000,
        margin in 0u64..1_000_000,
        before_ms in 1u64..10_000,
        after_ms in 0u64..10_000,
    ) {
        let store = CredentialStore::new(Arc::new(NoPersistence));
        store.set(CredentialPair::new("a", "r"), lifetime);
        let at = store.get().map(|s| s.expires_at);
        prop_assume!(at.is_some());
        let at = at.unwrap_or(SystemTime::UNIX_EPOCH);
        let margin = Duration::from_secs(margin);
        let deadline = at - margin;

        prop_assert!(store.is_valid_at(margin, deadline - Duration::from_millis(before_ms)));
        prop_assert!(!store.is_valid_at(margin, deadline));
        prop_assert!(!store.is_valid_at(margin, deadline + Duration::from_millis(after_ms)));
    }
}
