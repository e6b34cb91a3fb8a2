// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    top_level_message = { br#"{"message":"row not found"}"#, "row not found" },
    nested_error      = { br#"{"error":{"message":"permission denied"}}"#, "permission denied" },
    auth_description  = { br#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
                          "Invalid login credentials" },
    auth_msg          = { br#"{"code":400,"msg":"Email not confirmed"}"#, "Email not confirmed" },
    error_string      = { br#"{"error":"bucket_not_found"}"#, "bucket_not_found" },
    plain_text        = { b"upstream exploded", "upstream exploded" },
    unknown_json      = { br#"{"code":"PGRST"}"#, r#"{"code":"PGRST"}"# },
    empty_body        = { b"", "HTTP 503" },
)]
fn extract_message_from_envelope(body: &[u8], expected: &str) {
    assert_eq!(extract_message(503, body), expected);
}

#[test]
fn unauthenticated_ends_session() {
    let err = ApiError::Unauthenticated(AuthError::RefreshFailed(GrantFailure::Transport(
        "connection refused".into(),
    )));
    assert!(err.ends_session());
    assert_eq!(err.code(), "UNAUTHENTICATED");

    let err = ApiError::from(AuthError::NoCredential);
    assert!(err.ends_session());
}

#[test]
fn remote_and_invalid_do_not_end_session() {
    let err = ApiError::Remote { status: 409, message: "duplicate".into() };
    assert!(!err.ends_session());
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.code(), "REMOTE");

    let err = ApiError::Invalid("file is empty".into());
    assert!(!err.ends_session());
    assert_eq!(err.status(), None);
}

#[test]
fn all_candidates_failed_lists_each_candidate() {
    let err = ApiError::AllCandidatesFailed(vec![
        CandidateFailure {
            endpoint: "subjects_with_details".into(),
            error: ApiError::Remote { status: 404, message: "missing".into() },
        },
        CandidateFailure {
            endpoint: "subjects".into(),
            error: ApiError::Remote { status: 500, message: "boom".into() },
        },
    ]);
    let msg = err.to_string();
    assert!(msg.contains("subjects_with_details -> backend error (404): missing"), "{msg}");
    assert!(msg.contains("subjects -> backend error (500): boom"), "{msg}");
    assert!(!err.ends_session());
}

#[test]
fn refresh_failure_display_carries_detail() {
    let err = AuthError::RefreshFailed(GrantFailure::Rejected {
        status: 400,
        message: "Invalid Refresh Token".into(),
    });
    assert_eq!(err.to_string(), "credential refresh failed: rejected (400): Invalid Refresh Token");
}
