// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partial-success reports for batches of independent calls.

use serde_json::json;

use crate::api::ApiResponse;
use crate::error::ApiError;

/// Result of one batch item.
#[derive(Debug)]
pub struct ItemOutcome {
    pub label: String,
    pub result: Result<ApiResponse, ApiError>,
}

/// Per-item outcomes of a batch, in input order.
///
/// Failures are reported rather than swallowed; the caller decides whether
/// partial success is acceptable.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_ok()).count()
    }

    pub fn failures(&self) -> Vec<(&str, &ApiError)> {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().err().map(|e| (i.label.as_str(), e)))
            .collect()
    }

    /// True when every item succeeded (vacuously for an empty batch).
    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|i| i.result.is_ok())
    }

    /// Whether any failure should end the session.
    pub fn ends_session(&self) -> bool {
        self.items.iter().any(|i| matches!(&i.result, Err(e) if e.ends_session()))
    }

    pub fn summary(&self) -> serde_json::Value {
        let failed: Vec<_> = self
            .failures()
            .into_iter()
            .map(|(label, e)| json!({ "item": label, "code": e.code(), "error": e.to_string() }))
            .collect();
        json!({ "total": self.len(), "succeeded": self.succeeded(), "failed": failed })
    }
}
