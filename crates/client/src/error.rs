// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Deserialize;

/// Why a grant exchange (password or refresh) against the auth endpoint failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrantFailure {
    /// The backend answered with a non-2xx status.
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The request never produced a response.
    #[error("transport: {0}")]
    Transport(String),
    /// A 2xx response whose body was not a usable token grant.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Credential lifecycle failures.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// waited on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credential pair has ever been stored (or it was cleared).
    #[error("no credential available, sign in first")]
    NoCredential,
    /// The refresh exchange failed. The store is left untouched.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(GrantFailure),
    /// The backend denied a freshly refreshed credential.
    #[error("credential rejected by backend: {0}")]
    Rejected(String),
    /// The password grant failed.
    #[error("sign-in failed: {0}")]
    SignInFailed(GrantFailure),
}

/// Errors returned by the request executor.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No usable credential, or the single refresh-and-retry also failed auth.
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),
    /// A non-auth backend failure. Never retried.
    #[error("backend error ({status}): {message}")]
    Remote { status: u16, message: String },
    /// Connection, TLS, or timeout failure. Never retried by this layer.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Every fallback candidate failed.
    #[error("all candidate endpoints failed: {}", summarize(.0))]
    AllCandidatesFailed(Vec<CandidateFailure>),
    /// A 2xx body that did not decode into the expected shape.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// Rejected locally before anything was sent.
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Classification of one fallback candidate.
#[derive(Debug)]
pub struct CandidateFailure {
    pub endpoint: String,
    pub error: ApiError,
}

fn summarize(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} -> {}", f.endpoint, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ApiError {
    /// Whether the caller should clear the session and force re-login.
    ///
    /// Transport and remote errors never end the session.
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    /// HTTP status carried by the error, if the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether this is a transport timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Remote { .. } => "REMOTE",
            Self::Transport(_) => "TRANSPORT",
            Self::AllCandidatesFailed(_) => "ALL_CANDIDATES_FAILED",
            Self::Decode(_) => "DECODE",
            Self::Invalid(_) => "INVALID",
        }
    }
}

/// Backend error envelope. The data endpoints answer with `{message}` or
/// `{error: {message}}`; the auth endpoint uses `error_description` / `msg`.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Extract a human-readable message from an error response body.
///
/// Falls back to the raw body text, then to `HTTP {status}` for empty bodies.
pub fn extract_message(status: u16, body: &[u8]) -> String {
    if let Ok(env) = serde_json::from_slice::<ErrorEnvelope>(body) {
        let nested = match env.error {
            Some(serde_json::Value::Object(ref obj)) => {
                obj.get("message").and_then(|m| m.as_str()).map(str::to_owned)
            }
            Some(serde_json::Value::String(ref s)) => Some(s.clone()),
            _ => None,
        };
        if let Some(msg) = env.error_description.or(env.msg).or(env.message).or(nested) {
            if !msg.is_empty() {
                return msg;
            }
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {status}")
    } else {
        text.to_owned()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
