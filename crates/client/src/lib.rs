// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vedu: authenticated API access for the education platform backend.
//!
//! The crate owns the credential lifecycle (store, refresh, persistence)
//! and the request executor that retries once on authorization failure.
//! Screen-level callers talk to [`api::ApiClient`] and the typed wrappers
//! in [`education`].

pub mod api;
pub mod config;
pub mod credential;
pub mod education;
pub mod error;
pub mod test_support;

use std::sync::Once;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
