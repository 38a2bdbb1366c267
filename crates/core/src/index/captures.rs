//! Capture index operations.
//!
//! Rows are append-only. Timestamps are stored as RFC 3339 strings with
//! millisecond precision and a `Z` suffix so lexical order is time order.

use super::connection::CacheDb;
use crate::Error;
use crate::capture::{CaptureOutcome, CaptureRecord, Locator, StoredCapture};
use crate::contracts::{CaptureFilter, SearchIndex};
use crate::freshness::FreshnessWindow;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

const COLUMNS: &str =
    "url_key, original_url, captured_at, container, byte_offset, digest, mime_type, status_code, redirect_url";

/// Raw column values for one `captures` row.
struct CaptureRow {
    url_key: String,
    original_url: String,
    captured_at: String,
    container: Option<String>,
    byte_offset: Option<i64>,
    digest: Option<String>,
    mime_type: Option<String>,
    status_code: i64,
    redirect_url: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CaptureRow> {
    Ok(CaptureRow {
        url_key: row.get(0)?,
        original_url: row.get(1)?,
        captured_at: row.get(2)?,
        container: row.get(3)?,
        byte_offset: row.get(4)?,
        digest: row.get(5)?,
        mime_type: row.get(6)?,
        status_code: row.get(7)?,
        redirect_url: row.get(8)?,
    })
}

pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::CorruptRecord(format!("bad captured_at {raw:?}: {e}")))
}

impl TryFrom<CaptureRow> for CaptureRecord {
    type Error = Error;

    fn try_from(row: CaptureRow) -> Result<Self, Error> {
        let captured_at = decode_timestamp(&row.captured_at)?;

        let outcome = match (row.container, row.byte_offset) {
            (None, None) => CaptureOutcome::Failed,
            (Some(container), Some(offset)) => {
                let offset = u64::try_from(offset)
                    .map_err(|_| Error::CorruptRecord(format!("negative offset {offset} for {}", row.url_key)))?;
                let status_code = u16::try_from(row.status_code)
                    .map_err(|_| Error::CorruptRecord(format!("bad status {} for {}", row.status_code, row.url_key)))?;
                CaptureOutcome::Stored(StoredCapture {
                    locator: Locator { container, offset },
                    digest: row
                        .digest
                        .ok_or_else(|| Error::CorruptRecord(format!("missing digest for {}", row.url_key)))?,
                    mime_type: row.mime_type.unwrap_or_else(|| crate::adapter::UNKNOWN_MIME.to_string()),
                    status_code,
                    redirect_url: row.redirect_url,
                })
            }
            _ => return Err(Error::CorruptRecord(format!("partial locator for {}", row.url_key))),
        };

        Ok(CaptureRecord { url_key: row.url_key, original_url: row.original_url, captured_at, outcome })
    }
}

impl CacheDb {
    /// Append a capture record or failure marker.
    pub async fn insert_capture(&self, record: &CaptureRecord) -> Result<(), Error> {
        let url_key = record.url_key.clone();
        let original_url = record.original_url.clone();
        let captured_at = encode_timestamp(record.captured_at);
        let stored = match &record.outcome {
            CaptureOutcome::Stored(stored) => {
                let offset = i64::try_from(stored.locator.offset)
                    .map_err(|_| Error::InvalidInput(format!("offset {} out of range", stored.locator.offset)))?;
                Some((stored.clone(), offset))
            }
            CaptureOutcome::Failed => None,
        };

        self.conn
            .call(move |conn| -> Result<(), Error> {
                match stored {
                    Some((stored, offset)) => conn.execute(
                        "INSERT INTO captures (
                            url_key, original_url, captured_at, container, byte_offset,
                            digest, mime_type, status_code, redirect_url
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            url_key,
                            original_url,
                            captured_at,
                            stored.locator.container,
                            offset,
                            stored.digest,
                            stored.mime_type,
                            stored.status_code as i64,
                            stored.redirect_url,
                        ],
                    )?,
                    None => conn.execute(
                        "INSERT INTO captures (url_key, original_url, captured_at, status_code)
                        VALUES (?1, ?2, ?3, 0)",
                        params![url_key, original_url, captured_at],
                    )?,
                };
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// The newest record for `url_key` inside `window`.
    ///
    /// Returns None if no record matches.
    pub async fn closest_capture(
        &self, url_key: &str, window: &FreshnessWindow, filter: CaptureFilter,
    ) -> Result<Option<CaptureRecord>, Error> {
        let url_key = url_key.to_string();
        let start = encode_timestamp(window.start);
        let end = encode_timestamp(window.end);
        let stored_only = match filter {
            CaptureFilter::Any => "",
            CaptureFilter::StoredOnly => " AND container IS NOT NULL",
        };

        let row = self
            .conn
            .call(move |conn| -> Result<Option<CaptureRow>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM captures
                    WHERE url_key = ?1 AND captured_at >= ?2 AND captured_at <= ?3{stored_only}
                    ORDER BY captured_at DESC, id DESC
                    LIMIT 1"
                ))?;

                match stmt.query_row(params![url_key, start, end], read_row) {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(CaptureRecord::try_from).transpose()
    }

    /// All records for `url_key`, oldest first.
    pub async fn capture_history(&self, url_key: &str) -> Result<Vec<CaptureRecord>, Error> {
        let url_key = url_key.to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<CaptureRow>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM captures WHERE url_key = ?1 ORDER BY captured_at ASC, id ASC"
                ))?;
                let rows = stmt
                    .query_map(params![url_key], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter().map(CaptureRecord::try_from).collect()
    }
}

#[async_trait]
impl SearchIndex for CacheDb {
    async fn query_closest(
        &self, url_key: &str, window: &FreshnessWindow, filter: CaptureFilter,
    ) -> Result<Option<CaptureRecord>, Error> {
        self.closest_capture(url_key, window, filter).await
    }

    async fn insert(&self, record: &CaptureRecord) -> Result<(), Error> {
        self.insert_capture(record).await
    }

    async fn history(&self, url_key: &str) -> Result<Vec<CaptureRecord>, Error> {
        self.capture_history(url_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 17, 26, 17).unwrap()
    }

    fn make_stored(key: &str, at: DateTime<Utc>, offset: u64) -> CaptureRecord {
        CaptureRecord::stored(
            key,
            format!("http://{key}"),
            at,
            StoredCapture {
                locator: Locator::new("live-00000.arc", offset),
                digest: format!("sha256:{offset:064x}"),
                mime_type: "text/html".into(),
                status_code: 200,
                redirect_url: None,
            },
        )
    }

    #[tokio::test]
    async fn test_insert_and_query_closest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let record = make_stored("example.com/a", t0() - TimeDelta::minutes(10), 0);
        db.insert_capture(&record).await.unwrap();

        let window = FreshnessWindow::bounded(t0(), Duration::from_secs(3600));
        let found = db
            .closest_capture("example.com/a", &window, CaptureFilter::Any)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, record);
    }

    #[tokio::test]
    async fn test_query_unknown_key() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let window = FreshnessWindow::unbounded(t0());
        let found = db.closest_capture("never.seen/", &window, CaptureFilter::Any).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_query_respects_window() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_capture(&make_stored("example.com/a", t0() - TimeDelta::hours(2), 0))
            .await
            .unwrap();

        let window = FreshnessWindow::bounded(t0(), Duration::from_secs(3600));
        assert!(db.closest_capture("example.com/a", &window, CaptureFilter::Any).await.unwrap().is_none());

        let window = FreshnessWindow::unbounded(t0());
        assert!(db.closest_capture("example.com/a", &window, CaptureFilter::Any).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_query_window_start_is_inclusive() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let record = make_stored("example.com/a", t0() - TimeDelta::hours(1), 0);
        db.insert_capture(&record).await.unwrap();

        let window = FreshnessWindow::bounded(t0(), Duration::from_secs(3600));
        let found = db.closest_capture("example.com/a", &window, CaptureFilter::Any).await.unwrap();
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_closest_is_newest_in_window() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_capture(&make_stored("example.com/a", t0() - TimeDelta::minutes(30), 0))
            .await
            .unwrap();
        db.insert_capture(&make_stored("example.com/a", t0() - TimeDelta::minutes(5), 100))
            .await
            .unwrap();
        db.insert_capture(&make_stored("example.com/a", t0() - TimeDelta::minutes(50), 200))
            .await
            .unwrap();

        let window = FreshnessWindow::bounded(t0(), Duration::from_secs(3600));
        let found = db
            .closest_capture("example.com/a", &window, CaptureFilter::Any)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.locator().map(|l| l.offset), Some(100));
    }

    #[tokio::test]
    async fn test_failure_marker_round_trip() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let marker = CaptureRecord::failure("example.com/a", "http://example.com/a", t0());
        db.insert_capture(&marker).await.unwrap();

        let window = FreshnessWindow::unbounded(t0());
        let found = db
            .closest_capture("example.com/a", &window, CaptureFilter::Any)
            .await
            .unwrap()
            .unwrap();
        assert!(found.is_failure());
        assert_eq!(found.captured_at, t0());
    }

    #[tokio::test]
    async fn test_stored_only_skips_newer_failure() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let old = make_stored("example.com/a", t0() - TimeDelta::days(3), 0);
        db.insert_capture(&old).await.unwrap();
        db.insert_capture(&CaptureRecord::failure("example.com/a", "http://example.com/a", t0()))
            .await
            .unwrap();

        let window = FreshnessWindow::unbounded(t0());
        let any = db
            .closest_capture("example.com/a", &window, CaptureFilter::Any)
            .await
            .unwrap()
            .unwrap();
        assert!(any.is_failure());

        let stored = db
            .closest_capture("example.com/a", &window, CaptureFilter::StoredOnly)
            .await
            .unwrap();
        assert_eq!(stored, Some(old));
    }

    #[tokio::test]
    async fn test_inserts_never_overwrite() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_capture(&CaptureRecord::failure("example.com/a", "http://example.com/a", t0()))
            .await
            .unwrap();
        db.insert_capture(&CaptureRecord::failure("example.com/a", "http://example.com/a", t0()))
            .await
            .unwrap();
        db.insert_capture(&make_stored("example.com/a", t0() + TimeDelta::seconds(1), 0))
            .await
            .unwrap();

        let history = db.capture_history("example.com/a").await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].is_failure());
        assert!(history[1].is_failure());
        assert!(!history[2].is_failure());
    }

    #[tokio::test]
    async fn test_history_is_per_key() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_capture(&make_stored("example.com/a", t0(), 0)).await.unwrap();
        db.insert_capture(&make_stored("example.com/b", t0(), 100)).await.unwrap();

        assert_eq!(db.capture_history("example.com/a").await.unwrap().len(), 1);
        assert!(db.capture_history("example.com/c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_timestamp_is_infrastructure_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO captures (url_key, original_url, captured_at) VALUES ('k', 'u', 'not-a-date')",
                    [],
                )
            })
            .await
            .unwrap();

        let err = db.capture_history("k").await.unwrap_err();
        assert!(matches!(err, Error::CorruptRecord(_)));
        assert!(err.is_infrastructure());
    }
}
