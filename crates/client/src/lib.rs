//! Client code for livecache.
//!
//! This crate provides the HTTP fetch pipeline, URL canonicalization, and the
//! container-file archive that together back the live side of the lookup
//! policy.

pub mod archive;
pub mod fetch;

pub use archive::{ArchiveDir, LiveArchive, RecordHeader};
pub use fetch::{FetchClient, FetchConfig, FetchResponse, UrlCanonicalizer, canonicalize, url_key};
