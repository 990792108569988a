//! Bounded cache of opened per-dump store handles.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

type FlightReceiver<S, E> = watch::Receiver<Option<Result<Arc<S>, E>>>;

/// A bounded cache of opened read-only store handles, keyed by dump
/// filename.
///
/// Handles are borrowed for the duration of a closure via [`with`]; a
/// pin count guarantees that a handle selected for eviction is not closed
/// until every in-flight borrow completes. Opening a missing handle is
/// single-flighted per key.
///
/// Closing is dropping: the last `Arc` to a handle releases the underlying
/// store.
///
/// [`with`]: ConnectionCache::with
pub struct ConnectionCache<S: ?Sized, E> {
    capacity: usize,
    inner: Mutex<Inner<S, E>>,
    /// Runs after a handle is dropped, with the entry's key. Used to
    /// invalidate derived caches that must not outlive the connection.
    on_close: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl<S: ?Sized, E> std::fmt::Debug for ConnectionCache<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Inner<S: ?Sized, E> {
    entries: HashMap<String, Entry<S>>,
    /// Recency order over live (not yet evicted) entries.
    order: VecDeque<String>,
    flights: HashMap<String, FlightReceiver<S, E>>,
}

#[derive(Debug)]
struct Entry<S: ?Sized> {
    handle: Arc<S>,
    pins: u32,
    /// Evicted while borrowed; closed once `pins` returns to zero.
    doomed: bool,
}

enum Action<S: ?Sized, E> {
    Pinned(Arc<S>),
    Wait(FlightReceiver<S, E>),
    Lead(watch::Sender<Option<Result<Arc<S>, E>>>),
}

impl<S: ?Sized, E: Clone> ConnectionCache<S, E> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                flights: HashMap::new(),
            }),
            on_close: None,
        }
    }

    /// Like [`new`](Self::new), with a hook invoked (outside the cache lock)
    /// after an entry's handle has been dropped.
    #[must_use]
    pub fn with_close_hook(
        capacity: usize,
        on_close: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_close: Some(Box::new(on_close)),
            ..Self::new(capacity)
        }
    }

    /// Borrows the handle for `key`, opening it with `open` if absent, and
    /// runs `body` with the handle pinned. The handle cannot be closed by
    /// eviction while `body` runs.
    pub async fn with<R, F, Fut, B, BFut>(&self, key: &str, open: F, body: B) -> Result<R, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Arc<S>, E>>,
        B: FnOnce(Arc<S>) -> BFut,
        BFut: std::future::Future<Output = R>,
    {
        let handle = self.pin(key, open).await?;
        let _unpin = PinGuard { cache: self, key };
        Ok(body(handle).await)
    }

    /// Number of live (not doomed) cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_inner().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn pin<F, Fut>(&self, key: &str, open: F) -> Result<Arc<S>, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Arc<S>, E>>,
    {
        let mut open = Some(open);
        loop {
            let action = {
                let mut guard = self.lock_inner();
                let inner = &mut *guard;
                if let Some(entry) = inner.entries.get_mut(key) {
                    entry.pins += 1;
                    if entry.doomed {
                        // A borrow arrived before the evicted handle closed;
                        // bring it back instead of opening a duplicate.
                        entry.doomed = false;
                        inner.order.push_back(key.to_owned());
                    }
                    let handle = entry.handle.clone();
                    touch(&mut inner.order, key);
                    Action::Pinned(handle)
                } else if let Some(rx) = inner.flights.get(key) {
                    Action::Wait(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    inner.flights.insert(key.to_owned(), rx);
                    Action::Lead(tx)
                }
            };

            match action {
                Action::Pinned(handle) => return Ok(handle),
                Action::Wait(mut rx) => match rx.wait_for(Option::is_some).await {
                    Ok(state) => {
                        if let Some(Err(err)) = &*state {
                            return Err(err.clone());
                        }
                        // The leader installed the entry; loop to pin it.
                        continue;
                    }
                    // The leader was dropped before publishing and its guard
                    // cleared the flight; retry, and possibly become the new
                    // leader.
                    Err(_) => continue,
                },
                Action::Lead(tx) => {
                    // If this future is dropped while `open` runs (a caller
                    // timeout, an aborted request task), the flight must not
                    // outlive it: the guard clears it so a waiter observing
                    // the closed channel finds the key vacant and takes over
                    // as the new leader.
                    let mut flight = FlightGuard {
                        cache: self,
                        key,
                        armed: true,
                    };
                    let open = open.take().expect("leader opens the handle once");
                    let result = open().await;

                    let closed = {
                        let mut guard = self.lock_inner();
                        let inner = &mut *guard;
                        flight.disarm();
                        inner.flights.remove(key);
                        if let Ok(handle) = &result {
                            inner.entries.insert(
                                key.to_owned(),
                                Entry {
                                    handle: handle.clone(),
                                    pins: 1,
                                    doomed: false,
                                },
                            );
                            inner.order.push_back(key.to_owned());
                            self.evict_over_capacity(inner)
                        } else {
                            Vec::new()
                        }
                    };
                    self.notify_closed(&closed);

                    let _ = tx.send(Some(result.clone()));
                    return result;
                }
            }
        }
    }

    fn unpin(&self, key: &str) {
        let closed = {
            let mut inner = self.lock_inner();
            let Some(entry) = inner.entries.get_mut(key) else {
                return;
            };
            entry.pins = entry.pins.saturating_sub(1);
            if entry.doomed && entry.pins == 0 {
                inner.entries.remove(key);
                true
            } else {
                false
            }
        };
        if closed {
            self.notify_closed(std::slice::from_ref(&key.to_owned()));
        }
    }

    /// Must be called with the lock held; returns the keys whose handles were
    /// dropped so the caller can run the close hook outside the lock.
    fn evict_over_capacity(&self, inner: &mut Inner<S, E>) -> Vec<String> {
        let mut closed = Vec::new();
        while inner.order.len() > self.capacity {
            let Some(key) = inner.order.pop_front() else {
                break;
            };
            let Some(entry) = inner.entries.get_mut(&key) else {
                continue;
            };
            if entry.pins == 0 {
                inner.entries.remove(&key);
                closed.push(key);
            } else {
                // Deferred: the handle closes when its last borrow ends.
                entry.doomed = true;
            }
        }
        closed
    }

    fn notify_closed(&self, keys: &[String]) {
        let Some(on_close) = &self.on_close else {
            return;
        };
        for key in keys {
            on_close(key);
        }
    }

    #[track_caller]
    fn lock_inner(&self) -> MutexGuard<'_, Inner<S, E>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "quarry.cache",
                    cache = "connections",
                    file = loc.file(),
                    line = loc.line(),
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

fn touch(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
    order.push_back(key.to_owned());
}

/// Unpins on drop so borrows are released even if `body` panics.
struct PinGuard<'a, S: ?Sized, E: Clone> {
    cache: &'a ConnectionCache<S, E>,
    key: &'a str,
}

impl<S: ?Sized, E: Clone> Drop for PinGuard<'_, S, E> {
    fn drop(&mut self) {
        self.cache.unpin(self.key);
    }
}

/// Clears a leader's in-flight entry if the leader is dropped before it
/// publishes, so the key does not stay wedged on a closed channel.
struct FlightGuard<'a, S: ?Sized, E: Clone> {
    cache: &'a ConnectionCache<S, E>,
    key: &'a str,
    armed: bool,
}

impl<S: ?Sized, E: Clone> FlightGuard<'_, S, E> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<S: ?Sized, E: Clone> Drop for FlightGuard<'_, S, E> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.lock_inner().flights.remove(self.key);
        }
    }
}
