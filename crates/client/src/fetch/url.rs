//! URL canonicalization and index keys.
//!
//! [`canonicalize`] produces the URL that is actually fetched, while
//! [`url_key`] derives the scheme-insensitive key that captures are indexed
//! under, so `http://www.example.com:80/a` and `https://example.com/a` share
//! history.

use livecache_core::{Canonicalizer, Error};

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string for consistent caching and safety checks.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(mut host) = parsed.host_str() {
        let h = host.to_lowercase();
        host = h.as_str();
        parsed
            .set_host(Some(host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Index key for a URL.
///
/// Built from the canonical URL with the scheme dropped, a leading `www.`
/// stripped, the default port removed, and path plus query appended.
pub fn url_key(input: &str) -> Result<String, UrlError> {
    let url = canonicalize(input)?;
    let host = url.host_str().ok_or_else(|| UrlError::InvalidUrl(format!("{input} has no host")))?;
    let host = host.strip_prefix("www.").unwrap_or(host);

    let mut key = String::with_capacity(input.len());
    key.push_str(host);
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(url.path());
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }

    Ok(key)
}

/// [`Canonicalizer`] backed by [`url_key`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlCanonicalizer;

impl Canonicalizer for UrlCanonicalizer {
    fn canonicalize(&self, url: &str) -> Result<String, Error> {
        url_key(url).map_err(|e| Error::InvalidUrl(e.to_string()))
    }
}
