//! MCP tool implementations.
//!
//! This module contains all tools exposed by the livecache server.

pub mod history;
pub mod resolve;

use livecache_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Serialize a tool output as pretty JSON text content.
fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::handler::ServerState;
    use livecache_client::{ArchiveDir, FetchClient, FetchConfig, LiveArchive, UrlCanonicalizer};
    use livecache_core::{CacheDb, CaptureAdapter, Canonicalizer, LookupPolicy, PolicyConfig, SystemClock};
    use rmcp::model::CallToolResult;
    use serde::de::DeserializeOwned;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Server state over an in-memory index and a temporary archive.
    pub(crate) async fn test_state() -> (Arc<ServerState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let archive = ArchiveDir::open(dir.path(), "live", 1024 * 1024).await.unwrap();
        let fetcher = FetchClient::new(FetchConfig { timeout: Duration::from_secs(5), ..Default::default() }).unwrap();
        let canonicalizer: Arc<dyn Canonicalizer> = Arc::new(UrlCanonicalizer);

        let policy = LookupPolicy::new(
            index.clone(),
            Arc::new(LiveArchive::new(fetcher, archive)),
            Arc::clone(&canonicalizer),
            Arc::new(CaptureAdapter::new(canonicalizer)),
            PolicyConfig::default(),
        );

        let state =
            ServerState { policy, index, clock: Arc::new(SystemClock), default_max_age: Duration::from_secs(3600) };
        (Arc::new(state), dir)
    }

    /// Serve `response` verbatim to every connection.
    pub(crate) async fn serve(response: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    /// An address nothing is listening on.
    pub(crate) async fn closed_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    pub(crate) fn parse_output<T: DeserializeOwned>(result: &CallToolResult) -> T {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
