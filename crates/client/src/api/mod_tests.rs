// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    bare           = { "http://127.0.0.1:54321", "rest/v1/subjects", "http://127.0.0.1:54321/rest/v1/subjects" },
    trailing_slash = { "http://127.0.0.1:54321/", "/rest/v1/subjects", "http://127.0.0.1:54321/rest/v1/subjects" },
    with_prefix    = { "https://api.example.com/proxy", "rest/v1/rpc/f", "https://api.example.com/proxy/rest/v1/rpc/f" },
)]
fn resolves_paths_against_base(base: &str, path: &str, expected: &str) -> anyhow::Result<()> {
    let backend = Backend::new(base, "key")?;
    assert_eq!(backend.url(path)?.as_str(), expected);
    Ok(())
}

#[yare::parameterized(
    ftp      = { "ftp://example.com" },
    relative = { "example.com/api" },
    empty    = { "" },
)]
fn rejects_unusable_base_urls(base: &str) {
    let err = Backend::new(base, "key").err();
    assert!(matches!(err, Some(ApiError::Invalid(_))), "{err:?}");
}

#[test]
fn public_object_url_layout() -> anyhow::Result<()> {
    let backend = Backend::new("http://localhost:8000", "key")?;
    let url = backend.public_object_url("study-files", "123_notes.pdf")?;
    assert_eq!(
        url.as_str(),
        "http://localhost:8000/storage/v1/object/public/study-files/123_notes.pdf"
    );
    Ok(())
}

#[test]
fn operation_builders() {
    let op = Operation::rpc("toggle_subject_follow", serde_json::json!({ "subject_uuid": "s1" }));
    assert_eq!(op.method, Method::POST);
    assert_eq!(op.path, "rest/v1/rpc/toggle_subject_follow");
    assert!(matches!(op.body, Body::Json(_)));

    let op = Operation::get("rest/v1/subjects").query("select", "*");
    assert_eq!(op.query, vec![("select".to_owned(), "*".to_owned())]);
    assert_eq!(op.endpoint(), "GET rest/v1/subjects");

    let op = Operation::upload("profile-images", "u1.jpg", "image/jpeg", vec![1u8, 2, 3], true);
    assert_eq!(op.path, "storage/v1/object/profile-images/u1.jpg");
    assert_eq!(op.headers, vec![("x-upsert".to_owned(), "true".to_owned())]);
    match op.body {
        Body::Bytes { content_type, data } => {
            assert_eq!(content_type, "image/jpeg");
            assert_eq!(data.as_ref(), &[1, 2, 3]);
        }
        other => unreachable!("unexpected body {other:?}"),
    }
}

#[test]
fn response_decoding() -> anyhow::Result<()> {
    let resp = ApiResponse { status: 200, body: Bytes::from_static(br#"[{"id":1}]"#) };
    let rows: Vec<serde_json::Value> = resp.json()?;
    assert_eq!(rows.len(), 1);
    assert!(!resp.is_empty());

    let empty = ApiResponse { status: 204, body: Bytes::new() };
    assert!(empty.is_empty());
    let value: serde_json::Value = empty.json()?;
    assert!(value.is_null());
    let maybe: Option<Vec<u8>> = empty.json()?;
    assert_eq!(maybe, None);

    let garbage = ApiResponse { status: 200, body: Bytes::from_static(b"<html>") };
    assert!(matches!(garbage.json::<serde_json::Value>(), Err(ApiError::Decode(_))));
    assert_eq!(garbage.text(), "<html>");
    Ok(())
}
