// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key single-flight execution of fetches.
//!
//! The first caller for a key becomes the leader: it takes the result slot before the
//! registration lock is released, so every later caller for the same key queues on the
//! slot and wakes up to a clone of the leader's result. If the leader is dropped before it
//! stores a result, the slot is released empty and the next queued caller runs its own
//! fetch in the leader's place.
//!
//! Nothing is memoized here. Once a fetch has completed its entry is removed and the next
//! caller starts a new fetch, which is how failures stay retryable.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot<T> = AsyncMutex<Option<T>>;

/// The result of [`Flights::fetch_once`].
#[derive(Debug)]
pub(crate) struct Fetched<T> {
    pub value: T,
    /// `true` if the caller received the result of a fetch another caller ran.
    pub joined: bool,
}

/// A table of in-flight fetches keyed by `K`, each producing a `T`.
pub(crate) struct Flights<K, T> {
    in_flight: Mutex<HashMap<K, Weak<Slot<T>>>>,
}

impl<K, T> std::fmt::Debug for Flights<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flights").field("in_flight", &self.in_flight.lock().len()).finish()
    }
}

impl<K, T> Default for Flights<K, T> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

enum Role<T> {
    Leader(OwnedMutexGuard<Option<T>>),
    Follower,
}

impl<K, T> Flights<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `fetch` unless a fetch for `key` is already running, in which case its result
    /// is awaited instead.
    pub async fn fetch_once<F, Fut>(&self, key: K, fetch: F) -> Fetched<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let (slot, role) = self.register(&key);

        let (mut guard, joined) = match role {
            Role::Leader(guard) => (guard, false),
            Role::Follower => {
                let guard = Arc::clone(&slot).lock_owned().await;
                if let Some(value) = guard.as_ref() {
                    return Fetched {
                        value: value.clone(),
                        joined: true,
                    };
                }
                // The leader went away without a result, take over.
                (guard, false)
            }
        };

        let value = fetch().await;
        *guard = Some(value.clone());
        drop(guard);
        self.unregister(&key, &slot);

        Fetched { value, joined }
    }

    /// Number of keys with a live fetch.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().values().filter(|slot| slot.strong_count() > 0).count()
    }

    fn register(&self, key: &K) -> (Arc<Slot<T>>, Role<T>) {
        let mut in_flight = self.in_flight.lock();
        if let Some(slot) = in_flight.get(key).and_then(Weak::upgrade) {
            return (slot, Role::Follower);
        }

        let slot = Arc::new(AsyncMutex::new(None));
        in_flight.insert(key.clone(), Arc::downgrade(&slot));
        // A fresh mutex is always free; should that ever fail we simply queue on it.
        let role = Arc::clone(&slot).try_lock_owned().map_or(Role::Follower, Role::Leader);
        (slot, role)
    }

    fn unregister(&self, key: &K, slot: &Arc<Slot<T>>) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(key).is_some_and(|current| std::ptr::eq(current.as_ptr(), Arc::as_ptr(slot))) {
            in_flight.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures_util::{StreamExt, stream::FuturesUnordered};

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let flights = Flights::<&str, usize>::new();
        let calls = AtomicUsize::new(0);

        let futures = FuturesUnordered::new();
        for _ in 0..10 {
            futures.push(flights.fetch_once("k", || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                calls.fetch_add(1, Ordering::SeqCst) + 100
            }));
        }
        let results: Vec<_> = futures.collect().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|fetched| fetched.value == 100));
        assert_eq!(results.iter().filter(|fetched| fetched.joined).count(), 9);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_wait_for_each_other() {
        let flights = Flights::<u32, u32>::new();
        let (a, b) = tokio::join!(
            flights.fetch_once(1, || async { 1 }),
            flights.fetch_once(2, || async { 2 })
        );
        assert_eq!((a.value, b.value), (1, 2));
        assert!(!a.joined && !b.joined);
    }

    #[tokio::test]
    async fn completed_fetches_are_not_memoized() {
        let flights = Flights::<&str, Result<u32, String>>::new();

        let first = flights.fetch_once("k", || async { Err("down".to_owned()) }).await;
        let second = flights.fetch_once("k", || async { Ok(7) }).await;

        assert_eq!(first.value, Err("down".to_owned()));
        assert_eq!(second.value, Ok(7));
    }

    #[tokio::test]
    async fn follower_takes_over_from_cancelled_leader() {
        let flights = Arc::new(Flights::<&str, &str>::new());

        let leader = tokio::spawn({
            let flights = Arc::clone(&flights);
            async move {
                flights
                    .fetch_once("k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        "leader"
                    })
                    .await
                    .value
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let follower = tokio::spawn({
            let flights = Arc::clone(&flights);
            async move { flights.fetch_once("k", || async { "follower" }).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        let fetched = follower.await.unwrap();

        assert_eq!(fetched.value, "follower");
        assert!(!fetched.joined);
        assert_eq!(flights.in_flight(), 0);
    }
}
