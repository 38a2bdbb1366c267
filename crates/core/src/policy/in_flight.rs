//! Per-key single-flight slots for live fetches.
//!
//! Callers that miss the cache for the same key queue on one slot; only the
//! holder fetches, and the rest re-check the index once they get the slot.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;
type LockFuture = Pin<Box<dyn Future<Output = OwnedMutexGuard<()>> + Send>>;

/// Map from canonical key to the slot guarding its live fetch.
#[derive(Default)]
pub(crate) struct InFlight {
    slots: Slots,
}

impl InFlight {
    /// Wait for exclusive ownership of `key`'s slot.
    pub(crate) async fn acquire(&self, key: &str) -> InFlightGuard {
        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        let mut waiting =
            Waiting { key: key.to_string(), slots: Arc::clone(&self.slots), lock: Some(Box::pin(slot.lock_owned())) };
        let guard = std::future::poll_fn(|cx| waiting.poll_lock(cx)).await;

        InFlightGuard { key: key.to_string(), slots: Arc::clone(&self.slots), guard: Some(guard) }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.slots).len()
    }
}

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

/// Remove `key`'s slot if only the map still references it.
fn release_if_idle(slots: &mut HashMap<String, Arc<AsyncMutex<()>>>, key: &str) {
    if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
        slots.remove(key);
    }
}

/// A queued acquisition. Dropping it before the lock is granted, e.g. when
/// the caller is cancelled, gives up its reference and cleans the slot.
struct Waiting {
    key: String,
    slots: Slots,
    lock: Option<LockFuture>,
}

impl Waiting {
    fn poll_lock(&mut self, cx: &mut Context<'_>) -> Poll<OwnedMutexGuard<()>> {
        match self.lock.as_mut() {
            Some(lock) => lock.as_mut().poll(cx),
            None => Poll::Pending,
        }
    }
}

impl Drop for Waiting {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        self.lock.take();
        release_if_idle(&mut slots, &self.key);
    }
}

/// Held while a caller owns a key. Dropping it hands the slot to the next
/// waiter, or removes the slot when nobody is waiting.
pub(crate) struct InFlightGuard {
    key: String,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        self.guard.take();
        release_if_idle(&mut slots, &self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_slot_removed_after_release() {
        let in_flight = InFlight::default();
        let guard = in_flight.acquire("example.com/a").await;
        assert_eq!(in_flight.len(), 1);
        drop(guard);
        assert_eq!(in_flight.len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_slot() {
        let in_flight = InFlight::default();
        let holder = in_flight.acquire("example.com/a").await;

        let mut waiter = Box::pin(in_flight.acquire("example.com/a"));
        assert!(tokio::time::timeout(Duration::from_millis(10), &mut waiter).await.is_err());

        drop(holder);
        assert_eq!(in_flight.len(), 1);

        drop(waiter);
        assert_eq!(in_flight.len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_keeps_holder_slot() {
        let in_flight = InFlight::default();
        let holder = in_flight.acquire("example.com/a").await;

        let waiter = tokio::time::timeout(Duration::from_millis(10), in_flight.acquire("example.com/a")).await;
        assert!(waiter.is_err());
        assert_eq!(in_flight.len(), 1);

        drop(holder);
        assert_eq!(in_flight.len(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let in_flight = InFlight::default();
        let _a = in_flight.acquire("example.com/a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), in_flight.acquire("example.com/b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let in_flight = Arc::new(InFlight::default());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let in_flight = Arc::clone(&in_flight);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _guard = in_flight.acquire("example.com/a").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(in_flight.len(), 0);
    }
}
