// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request executor: attaches credentials, refreshes once on 401, walks
//! fallback candidates, and runs batches.

use std::sync::Arc;

use futures_util::future::join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ApiResponse, Backend, BatchReport, Body, ItemOutcome, Operation};
use crate::credential::manager::CredentialManager;
use crate::credential::{AccessToken, SessionEvent, UserIdentity};
use crate::error::{extract_message, ApiError, AuthError, CandidateFailure};

/// Sends per logical call: the original plus one retry after refresh.
const MAX_SENDS: u32 = 2;

/// Retry state of one logical call. A fallback walk shares a single
/// instance across all its candidates.
#[derive(Debug, Default)]
struct PendingRequest {
    retried: bool,
}

/// What came back from one send.
enum Sent {
    Success(ApiResponse),
    Unauthorized(String),
}

/// Executes authenticated backend calls.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    backend: Backend,
    credentials: Arc<CredentialManager>,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        backend: Backend,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        Self { http, backend, credentials }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.credentials.subscribe()
    }

    pub async fn ensure_valid(&self) -> Result<AccessToken, AuthError> {
        self.credentials.ensure_valid().await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        self.credentials.sign_in(email, password).await
    }

    pub async fn sign_out(&self) {
        self.credentials.sign_out().await
    }

    /// Create an account. Does not sign in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<serde_json::Value, ApiError> {
        self.credentials.auth().sign_up(email, password, name).await
    }

    /// Run one authenticated call.
    pub async fn execute(&self, op: &Operation) -> Result<ApiResponse, ApiError> {
        self.run(op, &mut PendingRequest::default()).await
    }

    /// Try `candidates` in order; the first 2xx wins.
    ///
    /// A 401 consumes the walk's single refresh-and-retry on the candidate
    /// that hit it. A 401 once that is spent ends the walk as
    /// `Unauthenticated`; any other failure is recorded and the walk moves
    /// on.
    pub async fn execute_with_fallback(
        &self,
        candidates: &[Operation],
    ) -> Result<ApiResponse, ApiError> {
        if candidates.is_empty() {
            return Err(ApiError::Invalid("no candidate endpoints".to_owned()));
        }
        let mut pending = PendingRequest::default();
        let mut failures = Vec::new();
        for op in candidates {
            match self.run(op, &mut pending).await {
                Ok(resp) => {
                    if !failures.is_empty() {
                        info!(
                            endpoint = %op.endpoint(),
                            skipped = failures.len(),
                            "fallback candidate succeeded"
                        );
                    }
                    return Ok(resp);
                }
                Err(e @ ApiError::Unauthenticated(_)) => return Err(e),
                Err(e) => {
                    warn!(endpoint = %op.endpoint(), err = %e, "fallback candidate failed");
                    failures.push(CandidateFailure { endpoint: op.endpoint(), error: e });
                }
            }
        }
        Err(ApiError::AllCandidatesFailed(failures))
    }

    /// Run independent calls concurrently and report each outcome in input
    /// order.
    pub async fn execute_batch<I>(&self, items: I) -> BatchReport
    where
        I: IntoIterator<Item = (String, Operation)>,
    {
        let calls = items.into_iter().map(|(label, op)| async move {
            let result = self.execute(&op).await;
            ItemOutcome { label, result }
        });
        let report = BatchReport { items: join_all(calls).await };
        if !report.is_complete() {
            warn!(
                total = report.len(),
                failed = report.len() - report.succeeded(),
                "batch completed with failures"
            );
        }
        report
    }

    async fn run(
        &self,
        op: &Operation,
        pending: &mut PendingRequest,
    ) -> Result<ApiResponse, ApiError> {
        let mut token = self.credentials.ensure_valid().await?;
        let mut rejection = String::new();
        for attempt in 1..=MAX_SENDS {
            match self.send(op, &token, attempt).await? {
                Sent::Success(resp) => return Ok(resp),
                Sent::Unauthorized(message) if !pending.retried => {
                    debug!(
                        endpoint = %op.endpoint(),
                        attempt,
                        %message,
                        "unauthorized, refreshing"
                    );
                    pending.retried = true;
                    token = self.credentials.refresh_rejected(&token).await?;
                }
                Sent::Unauthorized(message) => {
                    rejection = message;
                    break;
                }
            }
        }
        warn!(endpoint = %op.endpoint(), "credential rejected after refresh");
        Err(ApiError::Unauthenticated(AuthError::Rejected(rejection)))
    }

    async fn send(
        &self,
        op: &Operation,
        token: &AccessToken,
        attempt: u32,
    ) -> Result<Sent, ApiError> {
        let mut url = self.backend.url(&op.path)?;
        if !op.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(op.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let mut req = self
            .http
            .request(op.method.clone(), url)
            .header("apikey", self.backend.api_key())
            .bearer_auth(token.as_str());
        for (name, value) in &op.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req = match &op.body {
            Body::Empty => req,
            Body::Json(value) => req.json(value),
            Body::Bytes { content_type, data } => {
                req.header(CONTENT_TYPE, content_type.as_str()).body(data.clone())
            }
        };

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        debug!(endpoint = %op.endpoint(), status = status.as_u16(), attempt, "backend response");

        if status.is_success() {
            return Ok(Sent::Success(ApiResponse { status: status.as_u16(), body }));
        }
        let message = extract_message(status.as_u16(), &body);
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Sent::Unauthorized(message));
        }
        Err(ApiError::Remote { status: status.as_u16(), message })
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
