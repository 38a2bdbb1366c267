//! Live record to index record conversion.

use crate::capture::{CaptureRecord, LiveRecord, Locator, StoredCapture};
use crate::contracts::{Canonicalizer, RecordAdapter, url_key};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// MIME type recorded when the response carried no Content-Type.
pub const UNKNOWN_MIME: &str = "unk";

/// Content digest in `sha256:<hex>` form.
pub fn content_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Default [`RecordAdapter`].
///
/// Keys the record by the requested URL, not the post-redirect one, so the
/// next lookup for the same request finds it.
pub struct CaptureAdapter {
    canonicalizer: Arc<dyn Canonicalizer>,
}

impl CaptureAdapter {
    pub fn new(canonicalizer: Arc<dyn Canonicalizer>) -> Self {
        Self { canonicalizer }
    }
}

impl RecordAdapter for CaptureAdapter {
    fn adapt(&self, record: &LiveRecord, locator: Locator) -> CaptureRecord {
        let mime_type = record
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| UNKNOWN_MIME.to_string());

        let redirect_url = (record.final_url != record.url).then(|| record.final_url.clone());

        CaptureRecord::stored(
            url_key(self.canonicalizer.as_ref(), &record.url),
            record.url.clone(),
            record.fetched_at,
            StoredCapture {
                locator,
                digest: content_digest(&record.body),
                mime_type,
                status_code: record.status_code,
                redirect_url,
            },
        )
    }
}
