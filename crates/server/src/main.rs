//! livecache server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use livecache_client::{ArchiveDir, FetchClient, FetchConfig, LiveArchive, UrlCanonicalizer};
use livecache_core::{AppConfig, CacheDb, CaptureAdapter, Canonicalizer, Clock, LookupPolicy, SearchIndex, SystemClock};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    tracing::info!(
        db_path = %config.db_path.display(),
        archive_dir = %config.archive_dir.display(),
        "Starting livecache server on stdio transport"
    );

    let index: Arc<dyn SearchIndex> = Arc::new(CacheDb::open(&config.db_path).await?);
    let archive =
        ArchiveDir::open(&config.archive_dir, config.archive_prefix.clone(), config.max_container_bytes).await?;
    let fetcher = FetchClient::new(FetchConfig::from(&config))?;
    let canonicalizer: Arc<dyn Canonicalizer> = Arc::new(UrlCanonicalizer);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let policy = LookupPolicy::new(
        Arc::clone(&index),
        Arc::new(LiveArchive::new(fetcher, archive).with_clock(Arc::clone(&clock))),
        Arc::clone(&canonicalizer),
        Arc::new(CaptureAdapter::new(canonicalizer)),
        config.policy(),
    )
    .with_clock(Arc::clone(&clock));

    let state = Arc::new(handler::ServerState { policy, index, clock, default_max_age: config.default_max_age() });

    let handler = handler::LiveCacheServer::new(Arc::clone(&state));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    let reason = server.waiting().await?;
    tracing::info!(?reason, "server stopped");

    state.policy.shutdown().await;

    Ok(())
}
