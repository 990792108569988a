//! Cost-bounded cache with single-flight loading.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::lru::LruMap;

/// Capacity accounting for cached values.
///
/// The cache bounds the *sum of costs*, not the entry count, so large decoded
/// payloads displace proportionally more small ones. Over-counting is
/// preferred to under-counting.
pub trait EntryCost {
    fn cost(&self) -> u64;
}

type FlightResult<V, E> = Result<Arc<V>, E>;
type FlightReceiver<V, E> = watch::Receiver<Option<FlightResult<V, E>>>;

/// A bounded LRU cache whose values are produced by an async factory.
///
/// The factory for a missing key runs at most once per key at a time: while a
/// load is in flight, further requests for the same key wait and receive the
/// leader's result. A failed load is shared with its waiters and then
/// forgotten so the next request re-attempts. If a leader is dropped
/// mid-flight (request cancellation), a drop guard clears its flight entry
/// and closes its channel, and one of the waiters takes over as the new
/// leader.
#[derive(Debug)]
pub struct BoundedCache<K, V, E> {
    name: &'static str,
    capacity: u64,
    inner: Mutex<Inner<K, V, E>>,
}

#[derive(Debug)]
struct Inner<K, V, E> {
    entries: LruMap<K, V>,
    flights: HashMap<K, FlightReceiver<V, E>>,
}

enum Action<V, E> {
    Hit(Arc<V>),
    Wait(FlightReceiver<V, E>),
    Lead(watch::Sender<Option<FlightResult<V, E>>>),
}

impl<K, V, E> BoundedCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: EntryCost,
    E: Clone,
{
    #[must_use]
    pub fn new(name: &'static str, capacity: u64) -> Self {
        Self {
            name,
            capacity,
            inner: Mutex::new(Inner {
                entries: LruMap::default(),
                flights: HashMap::new(),
            }),
        }
    }

    /// Returns the cached value for `key`, loading it with `load` on a miss.
    pub async fn get_or_load<F, Fut>(&self, key: K, load: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        let mut load = Some(load);
        loop {
            let action = {
                let mut inner = self.lock_inner();
                if let Some(value) = inner.entries.get(&key) {
                    Action::Hit(value)
                } else if let Some(rx) = inner.flights.get(&key) {
                    Action::Wait(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    inner.flights.insert(key.clone(), rx);
                    Action::Lead(tx)
                }
            };

            match action {
                Action::Hit(value) => return Ok(value),
                Action::Wait(mut rx) => {
                    match rx.wait_for(Option::is_some).await {
                        Ok(state) => {
                            return state.clone().expect("flight publishes a result")
                        }
                        // The leader was dropped before publishing and its
                        // guard cleared the flight; retry, and possibly
                        // become the new leader.
                        Err(_) => continue,
                    }
                }
                Action::Lead(tx) => {
                    // If this future is dropped while the factory runs (a
                    // caller timeout, an aborted request task), the flight
                    // must not outlive it: the guard clears it so a waiter
                    // observing the closed channel finds the key vacant and
                    // takes over as the new leader.
                    let mut flight = FlightGuard {
                        cache: self,
                        key: &key,
                        armed: true,
                    };
                    let load = load.take().expect("leader runs the factory once");
                    let result = match load().await {
                        Ok(value) => Ok(Arc::new(value)),
                        Err(err) => Err(err),
                    };

                    {
                        let mut inner = self.lock_inner();
                        flight.disarm();
                        inner.flights.remove(&key);
                        if let Ok(value) = &result {
                            inner.entries.insert(key.clone(), value.clone(), value.cost());
                            self.evict_over_capacity(&mut inner);
                        }
                    }

                    // Waiters subscribed under the lock above; publishing after
                    // the state change means they observe a consistent cache.
                    let _ = tx.send(Some(result.clone()));
                    return result;
                }
            }
        }
    }

    /// Returns the cached value for `key` without loading on a miss.
    ///
    /// Used by callers that must distinguish "absent from the cache" from
    /// "absent from the store" before deciding whether to load: negative
    /// lookups are never cached.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.lock_inner().entries.get(key)
    }

    /// Keeps only the entries for which `predicate` holds. Used when a
    /// dump's connection is closed: its decoded payloads must not outlive it.
    pub fn retain(&self, predicate: impl Fn(&K) -> bool) {
        let mut inner = self.lock_inner();
        let mut kept = LruMap::default();
        while let Some((key, value)) = inner.entries.pop_lru() {
            if predicate(&key) {
                let cost = value.cost();
                kept.insert(key, value, cost);
            }
        }
        inner.entries = kept;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_inner().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_over_capacity(&self, inner: &mut Inner<K, V, E>) {
        while inner.entries.cost() > self.capacity && inner.entries.len() > 1 {
            if inner.entries.pop_lru().is_none() {
                break;
            }
        }
    }

    #[track_caller]
    fn lock_inner(&self) -> MutexGuard<'_, Inner<K, V, E>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "quarry.cache",
                    cache = self.name,
                    file = loc.file(),
                    line = loc.line(),
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

/// Clears a leader's in-flight entry if the leader is dropped before it
/// publishes, so the key does not stay wedged on a closed channel.
struct FlightGuard<'a, K, V, E>
where
    K: Eq + Hash + Clone,
    V: EntryCost,
    E: Clone,
{
    cache: &'a BoundedCache<K, V, E>,
    key: &'a K,
    armed: bool,
}

impl<K, V, E> FlightGuard<'_, K, V, E>
where
    K: Eq + Hash + Clone,
    V: EntryCost,
    E: Clone,
{
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<K, V, E> Drop for FlightGuard<'_, K, V, E>
where
    K: Eq + Hash + Clone,
    V: EntryCost,
    E: Clone,
{
    fn drop(&mut self) {
        if self.armed {
            self.cache.lock_inner().flights.remove(self.key);
        }
    }
}
