//! The read-only store contract a dump backend implements.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::StoreError;
use crate::types::{DocumentData, Model, MonikerRow, Pagination, ResultChunkData};

/// Read access to one dump's tables.
///
/// The storage format behind this trait is opaque to the query core; the
/// only contract is these operations and their return shapes. Implementations
/// must be safe to share across concurrent queries.
pub trait DumpStore: Send + Sync + 'static {
    /// Whether the dump contains a document at `path` (dump-root-relative).
    fn contains_document<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// The decoded document payload at `path`, or `None` when the dump does
    /// not cover that file.
    fn document<'a>(
        &'a self,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Option<DocumentData>, StoreError>>;

    /// Number of result chunks in this dump. Result ids are assigned to
    /// chunks by `id % count`.
    fn result_chunk_count(&self) -> BoxFuture<'_, Result<u64, StoreError>>;

    /// The decoded result chunk at `index`.
    fn result_chunk(
        &self,
        index: u64,
    ) -> BoxFuture<'_, Result<Option<ResultChunkData>, StoreError>>;

    /// Rows of the definitions or references table matching
    /// `(scheme, identifier)`, with the window applied, plus the total number
    /// of matching rows.
    fn moniker_rows<'a>(
        &'a self,
        model: Model,
        scheme: &'a str,
        identifier: &'a str,
        pagination: Pagination,
    ) -> BoxFuture<'a, Result<(Vec<MonikerRow>, u64), StoreError>>;
}

/// Opens dump stores by on-disk filename.
///
/// The connection cache calls this at most once per filename at a time;
/// dropping the returned handle closes the store.
pub trait StoreProvider: Send + Sync + 'static {
    fn open<'a>(
        &'a self,
        filename: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn DumpStore>, StoreError>>;
}
