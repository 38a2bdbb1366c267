//! cache_resolve tool implementation.
//!
//! Resolves a URL through the lookup policy and returns the archived content.

use chrono::SecondsFormat;
use livecache_core::{Error, Resolved};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::json_result;
use crate::handler::ServerState;

const DEFAULT_MAX_BODY_CHARS: usize = 100_000;

/// Input parameters for cache_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheResolveParams {
    /// The URL to resolve.
    pub url: String,

    /// Oldest acceptable capture age in milliseconds (default: server setting, 1 hour).
    #[serde(default)]
    pub max_age_ms: Option<u64>,

    /// Fall back to an older capture if the live fetch fails.
    #[serde(default)]
    pub allow_stale: bool,

    /// Truncate the returned body to this many characters (default: 100000).
    #[serde(default)]
    pub max_body_chars: Option<usize>,
}

/// Output structure for cache_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheResolveOutput {
    /// The URL the capture was taken of.
    pub url: String,
    /// Where the content came from: "cache", "live" or "stale_cache".
    pub source: String,
    /// ISO8601 timestamp of the capture.
    pub captured_at: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    /// Archive container holding the record.
    pub container: String,
    /// Byte offset of the record within the container.
    pub offset: u64,
    /// Body size in bytes before truncation.
    pub bytes: usize,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_truncated: bool,
}

impl CacheResolveOutput {
    fn new(resolved: Resolved, max_body_chars: usize) -> Self {
        let resource = resolved.resource;
        let text = String::from_utf8_lossy(&resource.body);
        let body_truncated = text.chars().count() > max_body_chars;
        let body = if body_truncated { text.chars().take(max_body_chars).collect() } else { text.into_owned() };

        Self {
            url: resource.url,
            source: resolved.source.as_str().to_string(),
            captured_at: resource.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            status_code: resource.status_code,
            content_type: resource.content_type,
            container: resource.locator.container,
            offset: resource.locator.offset,
            bytes: resource.body.len(),
            body,
            body_truncated,
        }
    }
}

/// Implementation of the cache_resolve tool.
pub async fn resolve_impl(state: &ServerState, params: CacheResolveParams) -> Result<CallToolResult, McpError> {
    let url = params.url.trim();
    if url.is_empty() {
        return Err(Error::InvalidInput("url must not be empty".to_string()).into());
    }

    let max_age = params.max_age_ms.map(Duration::from_millis).unwrap_or(state.default_max_age);
    let resolved = state.policy.resolve(url, max_age, params.allow_stale).await?;

    tracing::debug!(url, source = resolved.source.as_str(), locator = %resolved.resource.locator, "resolved");

    json_result(&CacheResolveOutput::new(resolved, params.max_body_chars.unwrap_or(DEFAULT_MAX_BODY_CHARS)))
}
