// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unverified reads of access-token claims. The backend verifies the
//! signature; the client only needs the subject to fill ownership fields.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// The `sub` claim (user id) of a JWT access token.
pub fn subject(token: &str) -> Option<String> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    Some(claims.sub)
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    use super::subject;

    fn token_with(payload: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.signature", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn reads_subject() {
        let token = token_with(r#"{"sub":"4f1c0c1e-user","role":"authenticated"}"#);
        assert_eq!(subject(&token).as_deref(), Some("4f1c0c1e-user"));
    }

    #[yare::parameterized(
        opaque      = { "not-a-jwt" },
        two_parts   = { "a.b" },
        four_parts  = { "a.b.c.d" },
        bad_base64  = { "a.!!!.c" },
    )]
    fn malformed_tokens_have_no_subject(token: &str) {
        assert_eq!(subject(token), None);
    }

    #[test]
    fn missing_sub_claim() {
        assert_eq!(subject(&token_with(r#"{"role":"anon"}"#)), None);
    }
}
