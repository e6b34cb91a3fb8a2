// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle across process restarts: sign-in, persistence,
//! expiry-driven refresh, and sign-out against a scripted backend.

use std::sync::Arc;
use std::time::Duration;

use vedu::api::Operation;
use vedu::credential::persist::{CredentialPersistence, FilePersistence};
use vedu::error::{ApiError, AuthError};
use vedu::test_support::{grant_body, MockBackend, Reply};

const PROFILES: &str = "GET /rest/v1/profiles";

fn file_persistence(dir: &tempfile::TempDir) -> Arc<FilePersistence> {
    Arc::new(FilePersistence::new(dir.path().join("state").join("credentials.json")))
}

#[tokio::test]
async fn session_survives_restart() -> anyhow::Result<()> {
    let mock = MockBackend::builder()
        .password_grant(vec![Reply::ok(grant_body("a1", "r1", 3600))])
        .guarded(PROFILES, "a1", vec![Reply::ok(serde_json::json!([{ "id": "user-1" }]))])
        .spawn()
        .await?;
    let dir = tempfile::tempdir()?;
    let persistence = file_persistence(&dir);

    let first = mock.client_with(persistence.clone(), Duration::from_secs(60))?;
    first.sign_in("ada@example.com", "pw").await?;
    first.execute(&Operation::get("rest/v1/profiles")).await?;
    drop(first);

    let second = mock.client_with(persistence.clone(), Duration::from_secs(60))?;
    assert!(second.credentials().restore().await);
    let response = second.execute(&Operation::get("rest/v1/profiles")).await?;
    assert_eq!(response.status, 200);

    assert_eq!(mock.hits(vedu::test_support::PASSWORD_ROUTE), 1);
    assert_eq!(mock.hits(vedu::test_support::REFRESH_ROUTE), 0);
    assert_eq!(mock.hits(PROFILES), 2);
    Ok(())
}

#[tokio::test]
async fn short_lived_session_refreshes_before_the_call() -> anyhow::Result<()> {
    // 30s lifetime is already inside the 60s margin.
    let mock = MockBackend::builder()
        .password_grant(vec![Reply::ok(grant_body("a1", "r1", 30))])
        .refresh_grant(vec![Reply::ok(grant_body("a2", "r2", 3600))])
        .guarded(PROFILES, "a2", vec![Reply::ok(serde_json::json!([]))])
        .spawn()
        .await?;
    let dir = tempfile::tempdir()?;
    let persistence = file_persistence(&dir);

    let client = mock.client_with(persistence.clone(), Duration::from_secs(60))?;
    client.sign_in("ada@example.com", "pw").await?;
    client.execute(&Operation::get("rest/v1/profiles")).await?;

    let refreshes = mock.requests_to("/auth/v1/token");
    let refresh = refreshes
        .iter()
        .find(|r| r.query.as_deref() == Some("grant_type=refresh_token"))
        .ok_or_else(|| anyhow::anyhow!("no refresh request"))?;
    assert_eq!(refresh.json()["refresh_token"], "r1");

    // The only data request already carried the rotated token.
    let data = mock.requests_to("/rest/v1/profiles");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].authorization.as_deref(), Some("Bearer a2"));

    let saved = persistence.load()?.ok_or_else(|| anyhow::anyhow!("nothing persisted"))?;
    assert_eq!(saved.pair.access_token, "a2");
    assert_eq!(saved.pair.refresh_token, "r2");
    Ok(())
}

#[tokio::test]
async fn revoked_refresh_token_keeps_the_persisted_pair() -> anyhow::Result<()> {
    let mock = MockBackend::builder()
        .password_grant(vec![Reply::ok(grant_body("a1", "r1", 30))])
        .refresh_grant(vec![Reply::error(400, "Invalid Refresh Token: Already Used")])
        .route(PROFILES, vec![Reply::ok(serde_json::json!([]))])
        .spawn()
        .await?;
    let dir = tempfile::tempdir()?;
    let persistence = file_persistence(&dir);

    let client = mock.client_with(persistence.clone(), Duration::from_secs(60))?;
    client.sign_in("ada@example.com", "pw").await?;
    let err = match client.execute(&Operation::get("rest/v1/profiles")).await {
        Ok(r) => anyhow::bail!("expected failure, got status {}", r.status),
        Err(e) => e,
    };

    assert!(err.ends_session(), "{err}");
    assert!(matches!(err, ApiError::Unauthenticated(AuthError::RefreshFailed(_))));
    assert_eq!(mock.hits(PROFILES), 0);
    assert!(persistence.load()?.is_some());
    Ok(())
}

#[tokio::test]
async fn sign_out_erases_the_file_and_blocks_calls() -> anyhow::Result<()> {
    let mock = MockBackend::builder()
        .password_grant(vec![Reply::ok(grant_body("a1", "r1", 3600))])
        .route(PROFILES, vec![Reply::ok(serde_json::json!([]))])
        .spawn()
        .await?;
    let dir = tempfile::tempdir()?;
    let persistence = file_persistence(&dir);

    let client = mock.client_with(persistence.clone(), Duration::from_secs(60))?;
    client.sign_in("ada@example.com", "pw").await?;
    assert!(persistence.path().exists());

    client.sign_out().await;
    assert!(!persistence.path().exists());

    let result = client.execute(&Operation::get("rest/v1/profiles")).await;
    assert!(matches!(result, Err(ApiError::Unauthenticated(AuthError::NoCredential))));
    assert_eq!(mock.hits(PROFILES), 0);

    let restarted = mock.client_with(persistence, Duration::from_secs(60))?;
    assert!(!restarted.credentials().restore().await);
    Ok(())
}
