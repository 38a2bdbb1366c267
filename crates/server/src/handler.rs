//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::history::{CacheHistoryParams, history_impl};
use crate::tools::resolve::{CacheResolveParams, resolve_impl};

use livecache_core::{Clock, LookupPolicy, SearchIndex};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use std::sync::Arc;
use std::time::Duration;

/// Shared state behind every tool call.
pub struct ServerState {
    pub policy: LookupPolicy,
    /// Same index the policy writes to, for read-only history queries.
    pub index: Arc<dyn SearchIndex>,
    pub clock: Arc<dyn Clock>,
    /// Freshness applied when a caller omits `max_age_ms`.
    pub default_max_age: Duration,
}

/// The main MCP server handler for livecache.
#[derive(Clone)]
pub struct LiveCacheServer {
    state: Arc<ServerState>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl LiveCacheServer {
    /// Create a new server handler.
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    /// Resolve a URL through the archive cache.
    ///
    /// Serves a stored capture when one is fresh enough, otherwise fetches
    /// live and archives the result.
    #[tool(
        description = "Resolve a URL through the archive cache. Serves a capture no older than max_age_ms, otherwise fetches and archives it live. With allow_stale, falls back to an older capture if the live fetch fails. Fails fast if the URL failed recently."
    )]
    async fn cache_resolve(&self, params: Parameters<CacheResolveParams>) -> Result<CallToolResult, McpError> {
        resolve_impl(&self.state, params.0).await
    }

    /// List every capture and failure marker recorded for a URL.
    #[tool(description = "List every capture and failed live fetch recorded for a URL, oldest first.")]
    async fn cache_history(&self, params: Parameters<CacheHistoryParams>) -> Result<CallToolResult, McpError> {
        history_impl(&self.state, params.0).await
    }
}

impl ServerHandler for LiveCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "livecache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::test_state;

    #[tokio::test]
    async fn test_router_lists_cache_tools() {
        let (state, _dir) = test_state().await;
        let server = LiveCacheServer::new(state);

        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();

        assert_eq!(names, ["cache_history", "cache_resolve"]);
    }

    #[tokio::test]
    async fn test_server_info() {
        let (state, _dir) = test_state().await;
        let info = LiveCacheServer::new(state).get_info();
        assert_eq!(info.server_info.name, "livecache");
    }
}
