// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted backend, builders, and assertion
//! helpers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::api::{http_client, ApiClient, Backend};
use crate::credential::auth::AuthEndpoint;
use crate::credential::manager::CredentialManager;
use crate::credential::persist::{CredentialPersistence, NoPersistence};
use crate::credential::store::CredentialStore;
use crate::credential::CredentialPair;

/// API key the scripted backend expects.
pub const TEST_API_KEY: &str = "test-anon-key";

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, body: body.to_string(), delay: Duration::ZERO }
    }

    pub fn ok(body: serde_json::Value) -> Self {
        Self::json(200, body)
    }

    /// A `{message}` error envelope.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "message": message }))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request as the scripted backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub apikey: Option<String>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct Script {
    replies: Vec<Reply>,
    hits: usize,
    served: usize,
    /// When set, requests without this bearer token get a 401.
    bearer: Option<String>,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Builder for a [`MockBackend`].
///
/// Routes are keyed `"METHOD /path"` or `"METHOD /path?query"`; a request
/// matches the exact query form first, then the bare path, then any key
/// ending in `*` by prefix. Each route replays its replies in order and
/// repeats the last one.
#[derive(Default)]
pub struct MockBackendBuilder {
    routes: HashMap<String, Script>,
}

impl MockBackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, key: &str, replies: Vec<Reply>) -> Self {
        self.routes.insert(key.to_owned(), Script { replies, ..Script::default() });
        self
    }

    /// A route that answers 401 unless the request carries `Bearer {token}`.
    /// Rejected requests still count as hits but do not consume replies.
    pub fn guarded(mut self, key: &str, token: &str, replies: Vec<Reply>) -> Self {
        self.routes.insert(
            key.to_owned(),
            Script { replies, bearer: Some(format!("Bearer {token}")), ..Script::default() },
        );
        self
    }

    /// Script `POST /auth/v1/token?grant_type=refresh_token`.
    pub fn refresh_grant(self, replies: Vec<Reply>) -> Self {
        self.route(REFRESH_ROUTE, replies)
    }

    /// Script `POST /auth/v1/token?grant_type=password`.
    pub fn password_grant(self, replies: Vec<Reply>) -> Self {
        self.route(PASSWORD_ROUTE, replies)
    }

    pub async fn spawn(self) -> anyhow::Result<MockBackend> {
        let state = Arc::new(MockState::default());
        state.routes.lock().extend(self.routes);
        let router = Router::new().fallback(handle).with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(MockBackend { addr, state, handle })
    }
}

pub const REFRESH_ROUTE: &str = "POST /auth/v1/token?grant_type=refresh_token";
pub const PASSWORD_ROUTE: &str = "POST /auth/v1/token?grant_type=password";

/// A scripted backend bound to a random local port.
pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder::new()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests that matched `key`.
    pub fn hits(&self, key: &str) -> usize {
        self.state.routes.lock().get(key).map(|s| s.hits).unwrap_or(0)
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// Requests whose path equals `path`.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    /// Build a client against this backend with the default margin.
    pub fn client(&self) -> anyhow::Result<ApiClient> {
        self.client_with(Arc::new(NoPersistence), Duration::from_secs(60))
    }

    pub fn client_with(
        &self,
        persistence: Arc<dyn CredentialPersistence>,
        margin: Duration,
    ) -> anyhow::Result<ApiClient> {
        let http = http_client(Duration::from_secs(5))?;
        let backend = Backend::new(&self.url(), TEST_API_KEY)?;
        let store = Arc::new(CredentialStore::new(persistence));
        let auth = AuthEndpoint::new(http.clone(), backend.clone());
        let manager = CredentialManager::new(store, auth, margin);
        Ok(ApiClient::new(http, backend, manager))
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let header_str =
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    let authorization = header_str("authorization");
    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        authorization: authorization.clone(),
        apikey: header_str("apikey"),
        content_type: header_str("content-type"),
        headers: headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
            .collect(),
        body,
    });

    let bare = format!("{method} {}", uri.path());
    let exact = match uri.query() {
        Some(q) => format!("{bare}?{q}"),
        None => bare.clone(),
    };
    let reply = {
        let mut routes = state.routes.lock();
        let key = if routes.contains_key(&exact) {
            exact
        } else if routes.contains_key(&bare) {
            bare
        } else {
            routes
                .keys()
                .find(|k| k.strip_suffix('*').is_some_and(|prefix| bare.starts_with(prefix)))
                .cloned()
                .unwrap_or(bare)
        };
        routes.get_mut(&key).and_then(|script| {
            script.hits += 1;
            if script.bearer.is_some() && script.bearer != authorization {
                return Some(Reply::error(401, "JWT expired"));
            }
            let idx = script.served.min(script.replies.len().saturating_sub(1));
            script.served += 1;
            script.replies.get(idx).cloned()
        })
    };
    let reply = reply.unwrap_or_else(|| Reply::error(404, "no scripted route"));

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    (
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
}

/// An unsigned JWT carrying `sub`, good enough for claim reads.
pub fn jwt(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "sub": sub }).to_string());
    format!("{header}.{payload}.sig")
}

/// Token grant body as the auth endpoint returns it.
pub fn grant_body(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": expires_in,
        "refresh_token": refresh,
        "user": {
            "id": "user-1",
            "email": "ada@example.com",
            "user_metadata": { "name": "Ada" }
        }
    })
}

pub fn pair(access: &str, refresh: &str) -> CredentialPair {
    CredentialPair::new(access, refresh)
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
