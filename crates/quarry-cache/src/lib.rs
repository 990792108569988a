//! Process-wide bounded caches for the query layer.
//!
//! Three caches back every query: connection handles to per-dump stores,
//! decoded document payloads, and decoded result-chunk payloads. Each is a
//! cost-bounded LRU with explicit construction (no global state) and
//! single-flight loading: the factory for a missing key runs at most once at
//! a time per key, and waiters share the leader's result, including its
//! failure.
//!
//! Cached values are immutable once inserted; they are handed out as `Arc`s,
//! so eviction only drops the cache's reference and outstanding readers keep
//! the value alive. The connection cache additionally pin-counts borrows so
//! a handle is never closed while a query is using it.

mod bounded;
mod connection;
mod lru;

pub use bounded::{BoundedCache, EntryCost};
pub use connection::ConnectionCache;
