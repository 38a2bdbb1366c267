//! Interfaces the lookup policy consumes.
//!
//! Index and archive are shared, externally synchronized services. The
//! policy reaches them only through these traits and treats both as
//! append-only.

use crate::Error;
use crate::capture::{CaptureRecord, LiveRecord, Locator, Resource};
use crate::freshness::FreshnessWindow;
use async_trait::async_trait;

/// Normalizes a URL string into the key the index is queried by.
pub trait Canonicalizer: Send + Sync {
    /// Deterministic and pure. Fails only on malformed input.
    fn canonicalize(&self, url: &str) -> Result<String, Error>;
}

/// Canonicalize `url`, degrading to the raw string when it is malformed.
pub fn url_key(canonicalizer: &dyn Canonicalizer, url: &str) -> String {
    match canonicalizer.canonicalize(url) {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(url, error = %e, "canonicalization failed, using raw URL as key");
            url.to_string()
        }
    }
}

/// Which records a closest-match query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFilter {
    /// Positive captures and failure markers.
    Any,
    /// Positive captures only.
    StoredOnly,
}

/// Searchable store of capture metadata.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// The record for `url_key` inside `window` closest to the window's end.
    ///
    /// `Ok(None)` is the normal "not found" outcome.
    async fn query_closest(
        &self, url_key: &str, window: &FreshnessWindow, filter: CaptureFilter,
    ) -> Result<Option<CaptureRecord>, Error>;

    /// Append a record. Existing records for the same key are left in place.
    async fn insert(&self, record: &CaptureRecord) -> Result<(), Error>;

    /// Every record for `url_key`, oldest first.
    async fn history(&self, url_key: &str) -> Result<Vec<CaptureRecord>, Error>;
}

/// Result of a live fetch attempt that did not hit an infrastructure fault.
#[derive(Debug, Clone)]
pub enum LiveOutcome {
    /// Fetched and durably written at `locator`.
    Captured { locator: Locator, record: LiveRecord },
    /// The live resource could not be retrieved.
    Unavailable(String),
}

/// Archive of captured content that can also capture from the live web.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Fetch `url` from the live web and store the bytes.
    ///
    /// `Err` is reserved for infrastructure faults; an unreachable resource
    /// is reported as [`LiveOutcome::Unavailable`].
    async fn fetch_live(&self, url: &str) -> Result<LiveOutcome, Error>;

    /// Read stored content. Must be side-effect free and repeatable.
    async fn read(&self, locator: &Locator) -> Result<Resource, Error>;

    /// Release any open containers.
    async fn shutdown(&self) {}
}

/// Maps a freshly fetched record to the metadata the index stores.
pub trait RecordAdapter: Send + Sync {
    /// Pure; `locator` is the position the archive reported for the write.
    fn adapt(&self, record: &LiveRecord, locator: Locator) -> CaptureRecord;
}
