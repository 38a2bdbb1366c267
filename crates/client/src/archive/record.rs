//! Container record header.
//!
//! Each record in a container is laid out as
//!
//! ```text
//! <url> <captured_at> <status> <content_type> <length>\n
//! <body: length bytes>\n
//! ```
//!
//! Fields are space separated. A missing content type is written as `-`,
//! and whitespace inside the content type is dropped.

use chrono::{DateTime, SecondsFormat, Utc};
use livecache_core::Error;

const NO_CONTENT_TYPE: &str = "-";

/// Parsed record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub url: String,
    pub captured_at: DateTime<Utc>,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub length: u64,
}

impl RecordHeader {
    /// Header line including the trailing newline.
    pub fn encode(&self) -> String {
        let content_type = self
            .content_type
            .as_deref()
            .map(|ct| ct.split_whitespace().collect::<String>())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| NO_CONTENT_TYPE.to_string());

        format!(
            "{} {} {} {} {}\n",
            self.url,
            self.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.status_code,
            content_type,
            self.length
        )
    }

    /// Parse a header line, with or without its trailing newline.
    ///
    /// # Errors
    ///
    /// Returns `Error::Archive` if the line does not have exactly five
    /// well-formed fields.
    pub fn parse(line: &str) -> Result<Self, Error> {
        let malformed = |what: &str| Error::Archive(format!("malformed record header ({what}): {}", line.trim_end()));

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [url, captured_at, status, content_type, length] = fields.as_slice() else {
            return Err(malformed("field count"));
        };

        let captured_at = DateTime::parse_from_rfc3339(captured_at)
            .map_err(|_| malformed("timestamp"))?
            .with_timezone(&Utc);
        let status_code = status.parse().map_err(|_| malformed("status"))?;
        let length = length.parse().map_err(|_| malformed("length"))?;
        let content_type = (*content_type != NO_CONTENT_TYPE).then(|| content_type.to_string());

        Ok(Self { url: url.to_string(), captured_at, status_code, content_type, length })
    }
}
