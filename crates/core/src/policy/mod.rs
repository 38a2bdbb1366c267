//! Cache lookup policy.
//!
//! Decides, per request, whether a stored capture can be served or a live
//! fetch is needed, and records every live outcome in the index:
//!
//! 1. Closest capture inside `[now - max_age, now]`. A positive capture is
//!    served from the archive; a failure marker younger than the failure TTL
//!    short-circuits with [`Error::RecentFailure`]; an older marker is ignored.
//! 2. On a miss, fetch live. Success is indexed and read back from the
//!    archive; failure writes a failure marker.
//! 3. After a failed fetch, and only if the caller allows it, fall back to
//!    the newest positive capture of any age.
//!
//! Each call writes at most one record. Infrastructure errors propagate
//! untouched and never produce failure markers.

mod in_flight;

use crate::Error;
use crate::capture::{CaptureOutcome, CaptureRecord, Resource};
use crate::clock::{Clock, SystemClock};
use crate::contracts::{ArchiveStore, CaptureFilter, Canonicalizer, LiveOutcome, RecordAdapter, SearchIndex, url_key};
use crate::freshness::{FreshnessWindow, failure_is_recent};
use in_flight::InFlight;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for [`LookupPolicy`].
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// How long a failure marker suppresses live fetches (default: 10 minutes).
    pub failure_ttl: Duration,

    /// Upper bound on a single live capture, fetch and archive write together (default: 30s).
    ///
    /// Hitting it counts as a failed fetch. A timeout that lands after the archive append
    /// leaves an unindexed record in the container and still writes a failure marker.
    pub live_fetch_timeout: Duration,

    /// Let at most one caller fetch a given key at a time (default: true).
    pub dedupe_live_fetches: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            failure_ttl: Duration::from_millis(600_000),
            live_fetch_timeout: Duration::from_millis(30_000),
            dedupe_live_fetches: true,
        }
    }
}

/// Which path produced a resolved resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedFrom {
    /// A capture inside the requested freshness window.
    Cache,
    /// A fresh live fetch made by this call.
    Live,
    /// An older capture served because the live fetch failed.
    StaleCache,
}

impl ResolvedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedFrom::Cache => "cache",
            ResolvedFrom::Live => "live",
            ResolvedFrom::StaleCache => "stale_cache",
        }
    }
}

/// Content returned by [`LookupPolicy::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    pub resource: Resource,
    pub source: ResolvedFrom,
}

enum LiveAttempt {
    Captured(Resource),
    Unavailable(String),
}

/// Arbitrates between the archive and the live web for a URL.
pub struct LookupPolicy {
    index: Arc<dyn SearchIndex>,
    store: Arc<dyn ArchiveStore>,
    canonicalizer: Arc<dyn Canonicalizer>,
    adapter: Arc<dyn RecordAdapter>,
    clock: Arc<dyn Clock>,
    config: PolicyConfig,
    in_flight: InFlight,
}

impl LookupPolicy {
    pub fn new(
        index: Arc<dyn SearchIndex>, store: Arc<dyn ArchiveStore>, canonicalizer: Arc<dyn Canonicalizer>,
        adapter: Arc<dyn RecordAdapter>, config: PolicyConfig,
    ) -> Self {
        Self {
            index,
            store,
            canonicalizer,
            adapter,
            clock: Arc::new(SystemClock),
            config,
            in_flight: InFlight::default(),
        }
    }

    /// Replace the wall clock, e.g. with a [`ManualClock`](crate::clock::ManualClock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// The index key `url` resolves under.
    pub fn url_key(&self, url: &str) -> String {
        url_key(self.canonicalizer.as_ref(), url)
    }

    /// Resolve `url` to archived content.
    ///
    /// `max_age` bounds how old a capture may be to be served without a live
    /// fetch. With `allow_stale`, a failed live fetch falls back to the newest
    /// capture of any age.
    ///
    /// # Errors
    ///
    /// - [`Error::RecentFailure`] if a live fetch for this URL failed within the failure TTL
    /// - [`Error::LiveUnavailable`] if no content is obtainable by any allowed path
    /// - an infrastructure error (see [`Error::is_infrastructure`]) if the index or archive fails
    pub async fn resolve(&self, url: &str, max_age: Duration, allow_stale: bool) -> Result<Resolved, Error> {
        let key = self.url_key(url);

        if let Some(resolved) = self.check_local(url, &key, max_age).await? {
            return Ok(resolved);
        }

        let _slot = if self.config.dedupe_live_fetches {
            let slot = self.in_flight.acquire(&key).await;
            // Whoever held the slot before us may have captured or failed this key.
            if let Some(resolved) = self.check_local(url, &key, max_age).await? {
                return Ok(resolved);
            }
            Some(slot)
        } else {
            None
        };

        let reason = match self.capture_live(url, &key).await? {
            LiveAttempt::Captured(resource) => return Ok(Resolved { resource, source: ResolvedFrom::Live }),
            LiveAttempt::Unavailable(reason) => reason,
        };

        if !allow_stale {
            tracing::info!("unable to live-get {url}, not allowed to use older captures");
            return Err(Error::LiveUnavailable(reason));
        }

        tracing::info!("second cached attempt for {url}, allowing older captures");
        let window = FreshnessWindow::unbounded(self.clock.now());
        let record = self
            .index
            .query_closest(&key, &window, CaptureFilter::StoredOnly)
            .await?;

        let Some(locator) = record.as_ref().and_then(CaptureRecord::locator) else {
            tracing::info!("unable to live-get {url} and no older capture is indexed");
            return Err(Error::LiveUnavailable(reason));
        };

        let resource = self.store.read(locator).await?;
        tracing::info!("got older capture of {url} from {locator}");
        Ok(Resolved { resource, source: ResolvedFrom::StaleCache })
    }

    /// Release archive resources.
    pub async fn shutdown(&self) {
        self.store.shutdown().await;
    }

    /// Look for a capture within `max_age`.
    ///
    /// `Ok(None)` means the live web should be tried.
    async fn check_local(&self, url: &str, key: &str, max_age: Duration) -> Result<Option<Resolved>, Error> {
        let now = self.clock.now();
        let window = FreshnessWindow::bounded(now, max_age);

        let Some(record) = self.index.query_closest(key, &window, CaptureFilter::Any).await? else {
            tracing::info!("{url} has not been cached recently enough");
            return Ok(None);
        };

        match &record.outcome {
            CaptureOutcome::Failed if failure_is_recent(record.captured_at, now, self.config.failure_ttl) => {
                tracing::info!("{url} has failed recently");
                Err(Error::RecentFailure(format!("{url} failed at {}", record.captured_at.to_rfc3339())))
            }
            CaptureOutcome::Failed => {
                tracing::info!("{url} failed a while ago");
                Ok(None)
            }
            CaptureOutcome::Stored(stored) => {
                let resource = self.store.read(&stored.locator).await?;
                tracing::info!("using cached {url} from {}", stored.locator);
                Ok(Some(Resolved { resource, source: ResolvedFrom::Cache }))
            }
        }
    }

    /// Fetch `url` live and index the outcome.
    async fn capture_live(&self, url: &str, key: &str) -> Result<LiveAttempt, Error> {
        tracing::info!("caching {url} from the live web");

        let outcome = match tokio::time::timeout(self.config.live_fetch_timeout, self.store.fetch_live(url)).await {
            Ok(outcome) => outcome?,
            Err(_) => LiveOutcome::Unavailable(format!(
                "live fetch timed out after {}ms",
                self.config.live_fetch_timeout.as_millis()
            )),
        };

        match outcome {
            LiveOutcome::Captured { locator, record } => {
                let mut capture = self.adapter.adapt(&record, locator.clone());
                if capture.url_key != key {
                    tracing::warn!(adapted = %capture.url_key, key, "adapter produced a different key, re-keying capture");
                    capture.url_key = key.to_string();
                }
                self.index.insert(&capture).await?;
                tracing::info!("added {url} at {locator} to the index");

                let resource = self.store.read(&locator).await?;
                Ok(LiveAttempt::Captured(resource))
            }
            LiveOutcome::Unavailable(reason) => {
                let marker = CaptureRecord::failure(key, url, self.clock.now());
                self.index.insert(&marker).await?;
                tracing::info!(reason = %reason, "added failure marker for {url} to the index");
                Ok(LiveAttempt::Unavailable(reason))
            }
        }
    }
}
