//! Freshness windows and TTL evaluation.
//!
//! Two ages are evaluated here and they must not be mixed up:
//! `max_age` bounds how old a positive capture may be to count as a hit,
//! `failure_ttl` bounds how long a failure marker suppresses live fetches.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Inclusive time range a capture must fall in to be acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FreshnessWindow {
    /// `[now - max_age, now]`, clamped at the Unix epoch.
    pub fn bounded(now: DateTime<Utc>, max_age: Duration) -> Self {
        let start = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |start| start.max(DateTime::<Utc>::UNIX_EPOCH));
        Self { start, end: now }
    }

    /// `[epoch, now]`, used when the caller accepts any older copy.
    pub fn unbounded(now: DateTime<Utc>) -> Self {
        Self { start: DateTime::<Utc>::UNIX_EPOCH, end: now }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Age of `ts` relative to `now`. Negative when `ts` lies in the future.
pub fn age(ts: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
    now.signed_duration_since(ts)
}

/// Whether `ts` is no older than `ttl`. The boundary counts as inside.
pub fn within(ts: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match TimeDelta::from_std(ttl) {
        Ok(ttl) => age(ts, now) <= ttl,
        Err(_) => true,
    }
}

/// Whether a failure marker stamped at `failed_at` still suppresses live fetches.
///
/// A marker whose age equals the TTL has expired.
pub fn failure_is_recent(failed_at: DateTime<Utc>, now: DateTime<Utc>, failure_ttl: Duration) -> bool {
    match TimeDelta::from_std(failure_ttl) {
        Ok(ttl) => age(failed_at, now) < ttl,
        Err(_) => true,
    }
}
