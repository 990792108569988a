//! Position and moniker queries against a single dump.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_core::{Dump, Position, RequestContext, ResultId};

use crate::caches::QueryCaches;
use crate::error::{DumpError, Result, StoreError};
use crate::store::{DumpStore, StoreProvider};
use crate::types::{
    HoverContent, InternalLocation, Model, MonikerRow, Pagination, RangesAtPosition,
};

/// Upper bound on locations materialised from a single result id.
///
/// Buggy indexers can emit result sets that explode; past this bound we log
/// and return what was accumulated instead of chewing through the rest.
const MAX_RESULT_LOCATIONS: usize = 10_000;

/// A reader over one dump.
///
/// Databases are cheap to construct; the heavy state (store handles, decoded
/// payloads) lives in the shared [`QueryCaches`]. Paths passed in are
/// dump-root-relative; paths in returned locations are repository-relative.
#[derive(Clone)]
pub struct Database {
    caches: Arc<QueryCaches>,
    provider: Arc<dyn StoreProvider>,
    dump: Dump,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dump", &self.dump)
            .finish_non_exhaustive()
    }
}

impl Database {
    #[must_use]
    pub fn new(caches: Arc<QueryCaches>, provider: Arc<dyn StoreProvider>, dump: Dump) -> Self {
        Self {
            caches,
            provider,
            dump,
        }
    }

    #[must_use]
    pub fn dump(&self) -> &Dump {
        &self.dump
    }

    /// Whether the dump contains a document at `path`.
    pub async fn exists(&self, ctx: &RequestContext, path: &str) -> Result<bool> {
        ctx.check_cancelled()?;
        flatten(
            self.caches
                .with_store(self.provider.as_ref(), &self.dump, |store| async move {
                    Ok(store.contains_document(path).await?)
                })
                .await,
        )
    }

    /// Definition locations for the symbol at `position`.
    ///
    /// The innermost range carrying a definition result wins; its result set
    /// is materialised even when empty.
    pub async fn definitions(
        &self,
        ctx: &RequestContext,
        path: &str,
        position: Position,
    ) -> Result<Vec<InternalLocation>> {
        ctx.check_cancelled()?;
        flatten(
            self.caches
                .with_store(self.provider.as_ref(), &self.dump, |store| async move {
                    let Some(document) =
                        self.caches.document(&store, self.dump.id, path).await?
                    else {
                        return Ok(Vec::new());
                    };
                    for range in document.ranges_at(position) {
                        ctx.check_cancelled()?;
                        let Some(result_id) = range.definition_result_id else {
                            continue;
                        };
                        return self.resolve_result(ctx, &store, result_id).await;
                    }
                    Ok(Vec::new())
                })
                .await,
        )
    }

    /// Reference locations for the symbol at `position`.
    ///
    /// Includes the defining sites reachable from the same ranges: a "find
    /// references" answer that omits the definition is useless to a client.
    /// The result may contain duplicates; callers deduplicate after merging
    /// with remote results.
    pub async fn references(
        &self,
        ctx: &RequestContext,
        path: &str,
        position: Position,
    ) -> Result<Vec<InternalLocation>> {
        ctx.check_cancelled()?;
        flatten(
            self.caches
                .with_store(self.provider.as_ref(), &self.dump, |store| async move {
                    let Some(document) =
                        self.caches.document(&store, self.dump.id, path).await?
                    else {
                        return Ok(Vec::new());
                    };
                    let mut locations = Vec::new();
                    for range in document.ranges_at(position) {
                        ctx.check_cancelled()?;
                        if let Some(result_id) = range.reference_result_id {
                            locations
                                .extend(self.resolve_result(ctx, &store, result_id).await?);
                        }
                        if let Some(result_id) = range.definition_result_id {
                            locations
                                .extend(self.resolve_result(ctx, &store, result_id).await?);
                        }
                    }
                    Ok(locations)
                })
                .await,
        )
    }

    /// Hover markup for the symbol at `position`: the innermost range with a
    /// hover result wins, and the triggering range rides along.
    pub async fn hover(
        &self,
        ctx: &RequestContext,
        path: &str,
        position: Position,
    ) -> Result<Option<HoverContent>> {
        ctx.check_cancelled()?;
        flatten(
            self.caches
                .with_store(self.provider.as_ref(), &self.dump, |store| async move {
                    let Some(document) =
                        self.caches.document(&store, self.dump.id, path).await?
                    else {
                        return Ok(None);
                    };
                    for range in document.ranges_at(position) {
                        let Some(hover_id) = range.hover_result_id else {
                            continue;
                        };
                        let text = document.hover_results.get(&hover_id).ok_or_else(|| {
                            DumpError::internal(format!(
                                "range references missing hover result {hover_id}"
                            ))
                        })?;
                        return Ok(Some(HoverContent {
                            text: text.clone(),
                            range: range.range,
                        }));
                    }
                    Ok(None)
                })
                .await,
        )
    }

    /// All ranges covering `position`, innermost first, with the decoded
    /// document so the caller can resolve moniker ids without re-reading.
    pub async fn ranges_by_position(
        &self,
        ctx: &RequestContext,
        path: &str,
        position: Position,
    ) -> Result<Option<RangesAtPosition>> {
        ctx.check_cancelled()?;
        flatten(
            self.caches
                .with_store(self.provider.as_ref(), &self.dump, |store| async move {
                    let Some(document) =
                        self.caches.document(&store, self.dump.id, path).await?
                    else {
                        return Ok(None);
                    };
                    let ranges = document.ranges_at(position);
                    Ok(Some(RangesAtPosition { document, ranges }))
                })
                .await,
        )
    }

    /// Looks up `(scheme, identifier)` in the dump's definitions or
    /// references table. Returns the windowed locations plus the total row
    /// count so callers can page through large symbol sets.
    pub async fn moniker_results(
        &self,
        ctx: &RequestContext,
        model: Model,
        scheme: &str,
        identifier: &str,
        pagination: Pagination,
    ) -> Result<(Vec<InternalLocation>, u64)> {
        ctx.check_cancelled()?;
        flatten(
            self.caches
                .with_store(self.provider.as_ref(), &self.dump, |store| async move {
                    let (rows, count) = store
                        .moniker_rows(model, scheme, identifier, pagination)
                        .await?;
                    let locations = rows
                        .into_iter()
                        .map(|row| self.location_from_row(row))
                        .collect();
                    Ok((locations, count))
                })
                .await,
        )
    }

    fn location_from_row(&self, row: MonikerRow) -> InternalLocation {
        InternalLocation {
            path: self.dump.path_in_repo(&row.path),
            range: row.range,
            dump: self.dump.clone(),
        }
    }

    /// Dereferences a result id through the chunk table into locations.
    async fn resolve_result(
        &self,
        ctx: &RequestContext,
        store: &Arc<dyn DumpStore>,
        result_id: ResultId,
    ) -> Result<Vec<InternalLocation>> {
        let chunk_count = store.result_chunk_count().await?;
        if chunk_count == 0 {
            return Err(DumpError::internal(
                "dump declares results but has no result chunks",
            ));
        }
        let index = result_id.to_raw() % chunk_count;
        let chunk = self.caches.result_chunk(store, self.dump.id, index).await?;

        let Some(pairs) = chunk.document_id_range_ids.get(&result_id) else {
            return Ok(Vec::new());
        };
        let pairs = if pairs.len() > MAX_RESULT_LOCATIONS {
            tracing::warn!(
                target = "quarry.dump",
                dump_id = %self.dump.id,
                %result_id,
                total = pairs.len(),
                limit = MAX_RESULT_LOCATIONS,
                "oversized result set truncated"
            );
            &pairs[..MAX_RESULT_LOCATIONS]
        } else {
            pairs.as_slice()
        };

        // Resolve document ids up front so the loads below can fan out.
        let mut paths = Vec::with_capacity(pairs.len());
        for (document_id, range_id) in pairs {
            let path = chunk.document_paths.get(document_id).ok_or_else(|| {
                DumpError::internal(format!(
                    "result chunk references unknown document {document_id}"
                ))
            })?;
            paths.push((path.as_str(), *range_id));
        }

        let mut unique: Vec<&str> = paths.iter().map(|(path, _)| *path).collect();
        unique.sort_unstable();
        unique.dedup();

        let loads = unique.iter().map(|path| {
            let store = Arc::clone(store);
            async move {
                let document = self
                    .caches
                    .document(&store, self.dump.id, path)
                    .await?
                    .ok_or_else(|| {
                        DumpError::internal(format!("result references unknown document {path}"))
                    })?;
                Ok::<_, DumpError>((*path, document))
            }
        });
        let loaded = futures::future::join_all(loads).await;
        // Cancellation wins over whatever errors raced with it.
        ctx.check_cancelled()?;

        let mut documents = HashMap::with_capacity(unique.len());
        for result in loaded {
            let (path, document) = result?;
            documents.insert(path, document);
        }

        let mut locations = Vec::with_capacity(paths.len());
        for (path, range_id) in paths {
            let document = &documents[path];
            let range = document.ranges.get(&range_id).ok_or_else(|| {
                DumpError::internal(format!(
                    "result references missing range {range_id} in {path}"
                ))
            })?;
            locations.push(InternalLocation {
                dump: self.dump.clone(),
                path: self.dump.path_in_repo(path),
                range: range.range,
            });
        }
        Ok(locations)
    }
}

fn flatten<T>(result: std::result::Result<Result<T>, StoreError>) -> Result<T> {
    result.map_err(DumpError::from)?
}
