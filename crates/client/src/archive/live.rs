//! Live-web archive store.

use std::sync::Arc;

use async_trait::async_trait;
use livecache_core::{ArchiveStore, Clock, Error, LiveOutcome, LiveRecord, Locator, Resource, SystemClock};

use super::ArchiveDir;
use crate::fetch::FetchClient;

/// [`ArchiveStore`] that fetches over HTTP and appends to an [`ArchiveDir`].
///
/// Fetch-level errors (bad URL, network failure, timeout, non-success status,
/// oversized body) become [`LiveOutcome::Unavailable`]. Archive write errors
/// are returned as errors.
pub struct LiveArchive {
    fetcher: FetchClient,
    archive: ArchiveDir,
    clock: Arc<dyn Clock>,
}

impl LiveArchive {
    pub fn new(fetcher: FetchClient, archive: ArchiveDir) -> Self {
        Self { fetcher, archive, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn archive(&self) -> &ArchiveDir {
        &self.archive
    }
}

#[async_trait]
impl ArchiveStore for LiveArchive {
    async fn fetch_live(&self, url: &str) -> Result<LiveOutcome, Error> {
        let response = match self.fetcher.fetch(url).await {
            Ok(response) => response,
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => {
                tracing::debug!(url, error = %e, "live fetch failed");
                return Ok(LiveOutcome::Unavailable(e.to_string()));
            }
        };

        let fetched_at = self.clock.now();
        let status_code = response.status.as_u16();
        let locator = self
            .archive
            .append(
                response.url.as_str(),
                fetched_at,
                status_code,
                response.content_type.as_deref(),
                &response.bytes,
            )
            .await?;

        let record = LiveRecord {
            url: response.url.to_string(),
            final_url: response.final_url.to_string(),
            fetched_at,
            status_code,
            content_type: response.content_type,
            body: response.bytes,
        };

        Ok(LiveOutcome::Captured { locator, record })
    }

    async fn read(&self, locator: &Locator) -> Result<Resource, Error> {
        self.archive.read(locator).await
    }

    async fn shutdown(&self) {
        if let Err(e) = self.archive.close().await {
            tracing::warn!(error = %e, "failed to close archive container");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `response` verbatim to every connection.
    async fn serve(response: &'static str) -> SocketAddr {
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

    async fn live_archive(dir: &tempfile::TempDir) -> LiveArchive {
        let fetcher = FetchClient::new(FetchConfig { timeout: Duration::from_secs(5), ..Default::default() }).unwrap();
        let archive = ArchiveDir::open(dir.path(), "live", 1024 * 1024).await.unwrap();
        LiveArchive::new(fetcher, archive)
    }

    #[tokio::test]
    async fn test_fetch_live_captures_and_reads_back() {
        let addr = serve(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: 12\r\nConnection: close\r\n\r\n<p>hello</p>",
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let store = live_archive(&dir).await;

        let url = format!("http://{addr}/page");
        let LiveOutcome::Captured { locator, record } = store.fetch_live(&url).await.unwrap() else {
            panic!("expected a capture");
        };

        assert_eq!(record.url, url);
        assert_eq!(record.status_code, 200);
        assert_eq!(record.body, Bytes::from_static(b"<p>hello</p>"));

        let resource = store.read(&locator).await.unwrap();
        assert_eq!(resource.url, url);
        assert_eq!(resource.body, record.body);
        assert_eq!(resource.content_type.as_deref(), Some("text/html;charset=utf-8"));

        store.shutdown().await;
        assert_eq!(store.read(&locator).await.unwrap(), resource);
    }

    #[tokio::test]
    async fn test_error_status_is_unavailable() {
        let addr = serve("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let dir = tempfile::tempdir().unwrap();
        let store = live_archive(&dir).await;

        let outcome = store.fetch_live(&format!("http://{addr}/")).await.unwrap();

        assert!(matches!(outcome, LiveOutcome::Unavailable(ref reason) if reason.contains("503")));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dir = tempfile::tempdir().unwrap();
        let store = live_archive(&dir).await;

        let outcome = store.fetch_live(&format!("http://{addr}/")).await.unwrap();

        assert!(matches!(outcome, LiveOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = live_archive(&dir).await;

        let outcome = store.fetch_live("gopher://example.com/").await.unwrap();

        assert!(matches!(outcome, LiveOutcome::Unavailable(ref reason) if reason.starts_with("INVALID_URL")));
    }
}
