//! Core types and shared functionality for livecache.
//!
//! This crate provides:
//! - The lookup policy deciding between archived and live content
//! - Capture index implementation with SQLite backend
//! - Collaborator traits for archives, canonicalizers, and record adapters
//! - Unified error types
//! - Configuration structures

pub mod adapter;
pub mod capture;
pub mod clock;
pub mod config;
pub mod contracts;
pub mod error;
pub mod freshness;
pub mod index;
pub mod policy;

pub use adapter::CaptureAdapter;
pub use capture::{CaptureOutcome, CaptureRecord, LiveRecord, Locator, Resource, StoredCapture};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use contracts::{ArchiveStore, Canonicalizer, CaptureFilter, LiveOutcome, RecordAdapter, SearchIndex};
pub use error::Error;
pub use freshness::FreshnessWindow;
pub use index::CacheDb;
pub use policy::{LookupPolicy, PolicyConfig, Resolved, ResolvedFrom};
