// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated access to the backend's data endpoints.

pub mod batch;
pub mod executor;

pub use batch::{BatchReport, ItemOutcome};
pub use executor::ApiClient;

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Path prefix of the table and RPC endpoints.
pub const REST_PREFIX: &str = "rest/v1";
/// Path prefix of the object storage endpoints.
pub const STORAGE_PREFIX: &str = "storage/v1/object";

/// Build the shared HTTP client. The transport timeout is the only timeout
/// applied to backend calls.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ApiError> {
    crate::ensure_crypto();
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Where the backend lives and the static key every request carries.
#[derive(Debug, Clone)]
pub struct Backend {
    base: Url,
    api_key: String,
}

impl Backend {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| ApiError::Invalid(format!("base url {base_url:?}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ApiError::Invalid(format!(
                "base url {base_url:?}: scheme must be http or https"
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base, api_key: api_key.into() })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Resolve a path relative to the base URL. A leading `/` is ignored so
    /// a base with a path prefix is kept.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Invalid(format!("path {path:?}: {e}")))
    }

    /// Public download URL of a stored object.
    pub fn public_object_url(&self, bucket: &str, name: &str) -> Result<Url, ApiError> {
        self.url(&format!("{STORAGE_PREFIX}/public/{bucket}/{name}"))
    }
}

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    /// Raw bytes, re-sent as-is on retry.
    Bytes { content_type: String, data: Bytes },
}

/// Descriptor of one logical backend call.
#[derive(Debug, Clone)]
pub struct Operation {
    pub method: Method,
    /// Relative to the backend base URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
    pub headers: Vec<(String, String)>,
}

impl Operation {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).json(body)
    }

    /// Call a backend function: `POST rest/v1/rpc/{name}`.
    pub fn rpc(name: &str, args: serde_json::Value) -> Self {
        Self::post_json(format!("{REST_PREFIX}/rpc/{name}"), args)
    }

    /// Store an object: `POST storage/v1/object/{bucket}/{name}`.
    pub fn upload(
        bucket: &str,
        name: &str,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
        upsert: bool,
    ) -> Self {
        let mut op = Self::new(Method::POST, format!("{STORAGE_PREFIX}/{bucket}/{name}"));
        op.body = Body::Bytes { content_type: content_type.into(), data: data.into() };
        if upsert {
            op = op.header("x-upsert", "true");
        }
        op
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Label used in logs and fallback reports.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// A 2xx response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    /// Decode the body. An empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if self.is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
