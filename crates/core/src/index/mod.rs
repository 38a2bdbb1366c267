//! SQLite-backed capture index.
//!
//! Persists capture records and failure markers using SQLite with async
//! access via tokio-rusqlite. It supports:
//!
//! - Closest-match queries inside a freshness window
//! - Append-only inserts (history is never rewritten)
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod captures;
pub mod connection;
pub mod migrations;

pub use connection::CacheDb;
