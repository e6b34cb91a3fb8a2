// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable mirror of the credential pair so a restarted process can
//! rehydrate without signing in again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::credential::CredentialPair;

/// Persisted form of the credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCredential {
    #[serde(flatten)]
    pub pair: CredentialPair,
    /// Expiry as milliseconds since Unix epoch.
    pub expires_at_ms: u64,
}

/// Key-value persistence collaborator the credential store mirrors into.
pub trait CredentialPersistence: Send + Sync {
    fn save(&self, pair: &CredentialPair, expires_at_ms: u64) -> anyhow::Result<()>;
    fn load(&self) -> anyhow::Result<Option<PersistedCredential>>;
    fn erase(&self) -> anyhow::Result<()>;
}

/// JSON file persistence with atomic writes (write tmp + rename).
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialPersistence for FilePersistence {
    /// Uses a unique temp filename (PID + counter) so concurrent saves never
    /// interleave bytes in a shared `.tmp` file.
    fn save(&self, pair: &CredentialPair, expires_at_ms: u64) -> anyhow::Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let record = PersistedCredential { pair: pair.clone(), expires_at_ms };
        let json = serde_json::to_string_pretty(&record)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Option<PersistedCredential>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: PersistedCredential = serde_json::from_str(&contents)?;
        if record.pair.access_token.is_empty() || record.pair.refresh_token.is_empty() {
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn erase(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process persistence. Counts writes so tests can observe mirroring.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    slot: Mutex<Option<PersistedCredential>>,
    saves: AtomicU32,
    erases: AtomicU32,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an already-persisted pair.
    pub fn with_record(record: PersistedCredential) -> Self {
        Self { slot: Mutex::new(Some(record)), ..Self::default() }
    }

    pub fn snapshot(&self) -> Option<PersistedCredential> {
        self.slot.lock().clone()
    }

    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::Relaxed)
    }

    pub fn erase_count(&self) -> u32 {
        self.erases.load(Ordering::Relaxed)
    }
}

impl CredentialPersistence for MemoryPersistence {
    fn save(&self, pair: &CredentialPair, expires_at_ms: u64) -> anyhow::Result<()> {
        *self.slot.lock() = Some(PersistedCredential { pair: pair.clone(), expires_at_ms });
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Option<PersistedCredential>> {
        Ok(self.slot.lock().clone())
    }

    fn erase(&self) -> anyhow::Result<()> {
        *self.slot.lock() = None;
        self.erases.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Persistence that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPersistence;

impl CredentialPersistence for NoPersistence {
    fn save(&self, _pair: &CredentialPair, _expires_at_ms: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Option<PersistedCredential>> {
        Ok(None)
    }

    fn erase(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
