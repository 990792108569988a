//! Per-dump reader for pre-computed index bundles.
//!
//! A dump is a self-contained read-only database mapping source positions to
//! definition, reference and hover results, plus moniker tables for symbols
//! that cross dump boundaries. This crate defines the store contract a dump
//! backend must implement ([`DumpStore`]), the decoded payload model, and the
//! [`Database`] reader that turns positions into locations.
//!
//! The reader never writes: dumps are produced by indexers and deleted
//! externally. Decoded payloads are cached process-wide (see
//! [`QueryCaches`]) and treated as immutable values.

mod caches;
mod database;
mod error;
mod store;
pub mod test_support;
mod types;

pub use caches::{CacheCapacities, QueryCaches};
pub use database::Database;
pub use error::{DumpError, StoreError};
pub use store::{DumpStore, StoreProvider};
pub use types::{
    DocumentData, HoverContent, InternalLocation, Model, MonikerRow, Pagination, RangeData,
    RangesAtPosition, ResultChunkData,
};
