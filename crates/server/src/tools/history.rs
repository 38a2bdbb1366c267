//! cache_history tool implementation.
//!
//! Lists every indexed capture and failure marker for a URL.

use chrono::SecondsFormat;
use livecache_core::freshness::within;
use livecache_core::{CaptureOutcome, CaptureRecord, Error};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::handler::ServerState;

/// Parameters for the cache_history tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheHistoryParams {
    /// The URL whose history to list.
    pub url: String,
}

/// One indexed record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HistoryEntry {
    /// ISO8601 timestamp of the capture or failed attempt.
    pub captured_at: String,
    /// "stored" or "failed".
    pub kind: String,
    pub original_url: String,
    pub container: Option<String>,
    pub offset: Option<u64>,
    pub status_code: Option<u16>,
    pub mime_type: Option<String>,
    pub digest: Option<String>,
    pub redirect_url: Option<String>,
    /// Whether the record falls inside the server's default freshness window.
    pub within_max_age: bool,
}

/// Output from the cache_history tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheHistoryOutput {
    /// Index key the URL resolved to.
    pub url_key: String,
    /// Records, oldest first.
    pub captures: Vec<HistoryEntry>,
}

impl HistoryEntry {
    fn new(record: CaptureRecord, within_max_age: bool) -> Self {
        let captured_at = record.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        match record.outcome {
            CaptureOutcome::Stored(stored) => Self {
                captured_at,
                kind: "stored".into(),
                original_url: record.original_url,
                container: Some(stored.locator.container),
                offset: Some(stored.locator.offset),
                status_code: Some(stored.status_code),
                mime_type: Some(stored.mime_type),
                digest: Some(stored.digest),
                redirect_url: stored.redirect_url,
                within_max_age,
            },
            CaptureOutcome::Failed => Self {
                captured_at,
                kind: "failed".into(),
                original_url: record.original_url,
                container: None,
                offset: None,
                status_code: None,
                mime_type: None,
                digest: None,
                redirect_url: None,
                within_max_age,
            },
        }
    }
}

/// Implementation of the cache_history tool.
pub async fn history_impl(state: &ServerState, params: CacheHistoryParams) -> Result<CallToolResult, McpError> {
    let url = params.url.trim();
    if url.is_empty() {
        return Err(Error::InvalidInput("url must not be empty".to_string()).into());
    }

    let url_key = state.policy.url_key(url);
    let now = state.clock.now();
    let records = state.index.history(&url_key).await?;

    let captures = records
        .into_iter()
        .map(|record| {
            let fresh = within(record.captured_at, now, state.default_max_age);
            HistoryEntry::new(record, fresh)
        })
        .collect();

    json_result(&CacheHistoryOutput { url_key, captures })
}
