//! Shared cache wiring for dump readers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quarry_cache::{BoundedCache, ConnectionCache};
use quarry_core::{Dump, DumpId};

use crate::error::{DumpError, StoreError};
use crate::store::{DumpStore, StoreProvider};
use crate::types::{DocumentData, ResultChunkData};

/// Capacities for the three query caches.
///
/// Connection capacity counts open handles; the payload capacities count
/// decoded entries (ranges, moniker records, result pairs), a cheap proxy for
/// memory.
#[derive(Debug, Clone, Copy)]
pub struct CacheCapacities {
    pub connections: usize,
    pub document_entries: u64,
    pub result_chunk_entries: u64,
}

impl Default for CacheCapacities {
    fn default() -> Self {
        Self {
            connections: 100,
            document_entries: 1024 * 10_000,
            result_chunk_entries: 1024 * 10_000,
        }
    }
}

/// The process-wide caches every [`Database`](crate::Database) reads through.
///
/// A dump owns its opened connection: when the connection cache closes a
/// handle, the decoded document and result-chunk entries for that dump are
/// dropped with it.
pub struct QueryCaches {
    connections: ConnectionCache<dyn DumpStore, StoreError>,
    documents: Arc<BoundedCache<(DumpId, String), DocumentData, DumpError>>,
    result_chunks: Arc<BoundedCache<(DumpId, u64), ResultChunkData, DumpError>>,
    /// Which dump each open filename belongs to, for close-time
    /// invalidation.
    dumps_by_filename: Arc<Mutex<HashMap<String, DumpId>>>,
}

impl std::fmt::Debug for QueryCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCaches").finish_non_exhaustive()
    }
}

impl QueryCaches {
    #[must_use]
    pub fn new(capacities: CacheCapacities) -> Arc<Self> {
        let documents = Arc::new(BoundedCache::new(
            "documents",
            capacities.document_entries,
        ));
        let result_chunks = Arc::new(BoundedCache::new(
            "result_chunks",
            capacities.result_chunk_entries,
        ));
        let dumps_by_filename: Arc<Mutex<HashMap<String, DumpId>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let connections = {
            let documents = Arc::clone(&documents);
            let result_chunks = Arc::clone(&result_chunks);
            let dumps_by_filename = Arc::clone(&dumps_by_filename);
            ConnectionCache::with_close_hook(capacities.connections, move |filename: &str| {
                let removed = dumps_by_filename
                    .lock()
                    .unwrap_or_else(|err| err.into_inner())
                    .remove(filename);
                let Some(dump_id) = removed else {
                    return;
                };
                tracing::debug!(
                    target = "quarry.cache",
                    %dump_id,
                    filename,
                    "connection closed; dropping decoded payloads"
                );
                documents.retain(|(id, _)| *id != dump_id);
                result_chunks.retain(|(id, _)| *id != dump_id);
            })
        };

        Arc::new(Self {
            connections,
            documents,
            result_chunks,
            dumps_by_filename,
        })
    }

    /// Borrows the store handle for `dump`, opening it through `provider` if
    /// needed; the handle stays open for the duration of `body`.
    pub(crate) async fn with_store<R, B, BFut>(
        &self,
        provider: &dyn StoreProvider,
        dump: &Dump,
        body: B,
    ) -> Result<R, StoreError>
    where
        B: FnOnce(Arc<dyn DumpStore>) -> BFut,
        BFut: std::future::Future<Output = R>,
    {
        self.dumps_by_filename
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(dump.filename.clone(), dump.id);
        self.connections
            .with(&dump.filename, || provider.open(&dump.filename), body)
            .await
    }

    /// The decoded document at `path` in `dump_id`, through the cache.
    /// Absence is not cached.
    pub(crate) async fn document(
        &self,
        store: &Arc<dyn DumpStore>,
        dump_id: DumpId,
        path: &str,
    ) -> Result<Option<Arc<DocumentData>>, DumpError> {
        let key = (dump_id, path.to_owned());
        if let Some(document) = self.documents.get(&key) {
            return Ok(Some(document));
        }
        if !store.contains_document(path).await? {
            return Ok(None);
        }
        let document = self
            .documents
            .get_or_load(key, || async {
                store.document(path).await?.ok_or_else(|| {
                    DumpError::internal(format!("document {path} listed but unreadable"))
                })
            })
            .await?;
        Ok(Some(document))
    }

    /// The decoded result chunk at `index` in `dump_id`, through the cache.
    /// A missing chunk is an invariant violation: some range referenced a
    /// result id that hashes into it.
    pub(crate) async fn result_chunk(
        &self,
        store: &Arc<dyn DumpStore>,
        dump_id: DumpId,
        index: u64,
    ) -> Result<Arc<ResultChunkData>, DumpError> {
        self.result_chunks
            .get_or_load((dump_id, index), || async {
                store.result_chunk(index).await?.ok_or_else(|| {
                    DumpError::internal(format!("result chunk {index} missing"))
                })
            })
            .await
    }
}
