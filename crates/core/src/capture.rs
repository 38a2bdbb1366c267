//! Capture data model.
//!
//! A [`CaptureRecord`] is one known outcome for a URL at a point in time:
//! either content stored in the archive, or a failure marker recording that
//! a live fetch was attempted and failed.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a record inside an archive container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub container: String,
    pub offset: u64,
}

impl Locator {
    pub fn new(container: impl Into<String>, offset: u64) -> Self {
        Self { container: container.into(), offset }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.container, self.offset)
    }
}

/// Metadata for a capture whose bytes live in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCapture {
    pub locator: Locator,
    pub digest: String,
    pub mime_type: String,
    pub status_code: u16,
    pub redirect_url: Option<String>,
}

/// What a capture attempt produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// Content was fetched and written to the archive.
    Stored(StoredCapture),
    /// A live fetch was attempted at `captured_at` and failed.
    Failed,
}

/// A single indexed outcome for a URL.
///
/// Records are append-only: a later fetch produces a new record, it never
/// rewrites an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub url_key: String,
    pub original_url: String,
    pub captured_at: DateTime<Utc>,
    pub outcome: CaptureOutcome,
}

impl CaptureRecord {
    /// Build a positive capture.
    pub fn stored(
        url_key: impl Into<String>, original_url: impl Into<String>, captured_at: DateTime<Utc>, stored: StoredCapture,
    ) -> Self {
        Self {
            url_key: url_key.into(),
            original_url: original_url.into(),
            captured_at,
            outcome: CaptureOutcome::Stored(stored),
        }
    }

    /// Build a failure marker stamped at `failed_at`.
    pub fn failure(url_key: impl Into<String>, original_url: impl Into<String>, failed_at: DateTime<Utc>) -> Self {
        Self {
            url_key: url_key.into(),
            original_url: original_url.into(),
            captured_at: failed_at,
            outcome: CaptureOutcome::Failed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, CaptureOutcome::Failed)
    }

    /// The archive locator, if this record has content.
    pub fn locator(&self) -> Option<&Locator> {
        match &self.outcome {
            CaptureOutcome::Stored(stored) => Some(&stored.locator),
            CaptureOutcome::Failed => None,
        }
    }
}

/// A record freshly fetched from the live web, before indexing.
#[derive(Debug, Clone)]
pub struct LiveRecord {
    /// The URL that was requested.
    pub url: String,
    /// The URL after redirects.
    pub final_url: String,
    pub fetched_at: DateTime<Utc>,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Archived content as read back from a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub locator: Locator,
    pub url: String,
    pub captured_at: DateTime<Utc>,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_marker_has_no_locator() {
        let marker = CaptureRecord::failure("example.com/a", "http://example.com/a", Utc::now());
        assert!(marker.is_failure());
        assert!(marker.locator().is_none());
    }

    #[test]
    fn test_stored_capture_exposes_locator() {
        let stored = StoredCapture {
            locator: Locator::new("live-00000.arc", 512),
            digest: "sha256:00".into(),
            mime_type: "text/html".into(),
            status_code: 200,
            redirect_url: None,
        };
        let record = CaptureRecord::stored("example.com/a", "http://example.com/a", Utc::now(), stored);
        assert!(!record.is_failure());
        assert_eq!(record.locator(), Some(&Locator::new("live-00000.arc", 512)));
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::new("live-00003.arc", 42).to_string(), "live-00003.arc@42");
    }
}
