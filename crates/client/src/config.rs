// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{http_client, ApiClient, Backend};
use crate::credential::auth::AuthEndpoint;
use crate::credential::manager::CredentialManager;
use crate::credential::persist::{CredentialPersistence, FilePersistence, NoPersistence};
use crate::credential::store::CredentialStore;
use crate::credential::{default_credentials_path, DEFAULT_REFRESH_MARGIN_SECS};

/// Endpoints tried in order when listing subjects.
pub const DEFAULT_SUBJECT_ENDPOINTS: &str =
    "subjects_with_details,subjects,rpc/get_subjects_with_categories";

/// Backend and credential settings.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Backend base URL.
    #[arg(long, env = "VEDU_API_URL", default_value = "http://127.0.0.1:54321")]
    pub base_url: String,

    /// Static API key sent with every request.
    #[arg(long, env = "VEDU_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Seconds before expiry at which the access token is refreshed.
    #[arg(long, env = "VEDU_REFRESH_MARGIN_SECS", default_value_t = DEFAULT_REFRESH_MARGIN_SECS)]
    pub refresh_margin_secs: u64,

    /// Transport timeout for every backend call, in seconds.
    #[arg(long, env = "VEDU_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Where the credential pair is persisted between runs.
    #[arg(long, env = "VEDU_CREDENTIALS")]
    pub credentials_path: Option<PathBuf>,

    /// Subject listing endpoints, tried in order (relative to rest/v1).
    #[arg(
        long,
        env = "VEDU_SUBJECT_ENDPOINTS",
        value_delimiter = ',',
        default_value = DEFAULT_SUBJECT_ENDPOINTS
    )]
    pub subject_endpoints: Vec<String>,

    /// Keep credentials in memory only.
    #[arg(long, env = "VEDU_NO_PERSIST")]
    pub no_persist: bool,

    /// Log format (json or text).
    #[arg(long, env = "VEDU_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "VEDU_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ClientConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.trim().is_empty() {
            anyhow::bail!("--api-key (or VEDU_API_KEY) must be set");
        }
        Backend::new(&self.base_url, "")?;
        if self.subject_endpoints.iter().all(|e| e.trim().is_empty()) {
            anyhow::bail!("--subject-endpoints must name at least one endpoint");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("--timeout-secs must be positive");
        }
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid log format: {other} (expected json or text)"),
        }
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Non-empty candidate endpoints, trimmed.
    pub fn subject_candidates(&self) -> Vec<String> {
        self.subject_endpoints
            .iter()
            .map(|e| e.trim().trim_matches('/').to_owned())
            .filter(|e| !e.is_empty())
            .collect()
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.credentials_path.clone().unwrap_or_else(default_credentials_path)
    }

    pub fn persistence(&self) -> Arc<dyn CredentialPersistence> {
        if self.no_persist {
            Arc::new(NoPersistence)
        } else {
            Arc::new(FilePersistence::new(self.credentials_file()))
        }
    }

    /// Wire up store, manager and executor. Does not touch the network or
    /// restore persisted credentials.
    pub fn build_client(&self) -> anyhow::Result<ApiClient> {
        self.validate()?;
        let http = http_client(self.timeout())?;
        let backend = Backend::new(&self.base_url, self.api_key.clone())?;
        let store = Arc::new(CredentialStore::new(self.persistence()));
        let auth = AuthEndpoint::new(http.clone(), backend.clone());
        let manager = CredentialManager::new(store, auth, self.refresh_margin());
        Ok(ApiClient::new(http, backend, manager))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
