//! The query pipelines.

use std::collections::HashSet;
use std::sync::Arc;

use quarry_core::{
    sort_monikers, Dump, DumpId, Moniker, MonikerKind, PackageInformation, Position, RepoId,
    RequestContext,
};
use quarry_dump::{
    Database, DocumentData, HoverContent, InternalLocation, Model, Pagination, QueryCaches,
    RangeData, StoreProvider,
};

use crate::config::BackendConfig;
use crate::cursor::{CursorPhase, ReferenceCursor};
use crate::error::{QueryError, Result};
use crate::metadata::MetadataStore;

/// The query-serving core.
///
/// Construction wires the shared caches; everything else is borrowed: the
/// metadata store and the dump files are owned by their respective services.
pub struct Backend {
    metadata: Arc<dyn MetadataStore>,
    provider: Arc<dyn StoreProvider>,
    caches: Arc<QueryCaches>,
    config: BackendConfig,
}

/// One page of a reference query.
#[derive(Debug, Clone, Default)]
pub struct ReferencesPage {
    pub locations: Vec<InternalLocation>,
    /// Present while remote pages remain; echo it back to continue.
    pub cursor: Option<ReferenceCursor>,
}

/// A reference query, initial or continued.
#[derive(Debug, Clone)]
pub struct ReferencesRequest {
    pub repository_id: RepoId,
    pub commit: String,
    pub path: String,
    pub position: Position,
    /// Skip closest-dump selection and query this dump directly. The caller
    /// asserts the dump covers the path.
    pub dump_id: Option<DumpId>,
    /// Upper bound on remote dumps consulted per page; `None` uses the
    /// configured default.
    pub limit: Option<u64>,
    pub cursor: Option<ReferenceCursor>,
}

impl Backend {
    #[must_use]
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        provider: Arc<dyn StoreProvider>,
        config: BackendConfig,
    ) -> Self {
        Self {
            metadata,
            provider,
            caches: QueryCaches::new(config.cache_capacities),
            config,
        }
    }

    /// The closest dumps that actually contain `path`, nearest commit first.
    ///
    /// An empty answer means precise intelligence is not available for the
    /// document.
    pub async fn exists(
        &self,
        ctx: &RequestContext,
        repository_id: RepoId,
        commit: &str,
        path: &str,
    ) -> Result<Vec<Dump>> {
        let databases = self.closest_databases(ctx, repository_id, commit, path).await?;
        Ok(databases.into_iter().map(|(db, _)| db.dump().clone()).collect())
    }

    /// Where the symbol at `position` is defined.
    ///
    /// Errors with [`QueryError::NoDumpFound`] when no dump covers the file;
    /// an empty list means the dump covers it but records no definition.
    pub async fn definitions(
        &self,
        ctx: &RequestContext,
        repository_id: RepoId,
        commit: &str,
        path: &str,
        position: Position,
        dump_id: Option<DumpId>,
    ) -> Result<Vec<InternalLocation>> {
        let (database, path_in_db) = self
            .resolve_database(ctx, repository_id, commit, path, dump_id)
            .await?;
        self.definitions_in(ctx, &database, &path_in_db, position)
            .await
    }

    /// Documentation for the symbol at `position`.
    ///
    /// Falls back to the defining dump when the local dump records monikers
    /// without hover text: the definition's home dump is authoritative.
    pub async fn hover(
        &self,
        ctx: &RequestContext,
        repository_id: RepoId,
        commit: &str,
        path: &str,
        position: Position,
        dump_id: Option<DumpId>,
    ) -> Result<Option<HoverContent>> {
        let (database, path_in_db) = self
            .resolve_database(ctx, repository_id, commit, path, dump_id)
            .await?;

        if let Some(hover) = database.hover(ctx, &path_in_db, position).await? {
            return Ok(Some(hover));
        }

        let definitions = self
            .definitions_in(ctx, &database, &path_in_db, position)
            .await?;
        let Some(definition) = definitions.first() else {
            return Ok(None);
        };
        let Some(def_path) = definition.dump.path_in_dump(&definition.path) else {
            return Ok(None);
        };
        let def_database = self.database(definition.dump.clone());
        Ok(def_database
            .hover(ctx, &def_path, definition.range.start)
            .await?)
    }

    /// Where the symbol at the request position is referenced, across dumps
    /// and repositories.
    ///
    /// The initial page is deduplicated against itself; continued pages are
    /// new results only and the client merges (duplicates across pages are
    /// possible when local moniker-table hits also appear in a remote dump's
    /// tables; see the module docs of [`crate::pagination`]).
    pub async fn references(
        &self,
        ctx: &RequestContext,
        request: ReferencesRequest,
    ) -> Result<ReferencesPage> {
        let limit = request.limit.unwrap_or(self.config.remote_dump_limit).max(1);
        match &request.cursor {
            Some(cursor) => {
                let cursor = cursor.clone();
                self.resume_references(ctx, &request, limit, cursor).await
            }
            None => self.initial_references(ctx, &request, limit).await,
        }
    }

    async fn initial_references(
        &self,
        ctx: &RequestContext,
        request: &ReferencesRequest,
        limit: u64,
    ) -> Result<ReferencesPage> {
        let (database, path_in_db) = self
            .resolve_database(
                ctx,
                request.repository_id,
                &request.commit,
                &request.path,
                request.dump_id,
            )
            .await?;

        let mut locations = database.references(ctx, &path_in_db, request.position).await?;

        let Some(at) = database
            .ranges_by_position(ctx, &path_in_db, request.position)
            .await?
        else {
            return Ok(ReferencesPage {
                locations: dedup_locations(locations),
                cursor: None,
            });
        };

        for range in &at.ranges {
            let monikers = monikers_for_range(&at.document, range)?;

            // A "find references" answer must include occurrences linked only
            // through the moniker tables, so these are appended
            // unconditionally.
            for moniker in &monikers {
                let (rows, _) = database
                    .moniker_results(
                        ctx,
                        Model::Reference,
                        &moniker.scheme,
                        &moniker.identifier,
                        Pagination::default(),
                    )
                    .await?;
                locations.extend(rows);
            }

            // The first import moniker with resolvable package metadata
            // carries the query out of this dump.
            for moniker in &monikers {
                if moniker.kind != MonikerKind::Import {
                    continue;
                }
                let Some(package) = package_information(&at.document, moniker) else {
                    continue;
                };
                tracing::debug!(
                    target = "quarry.backend",
                    moniker = %moniker.identifier,
                    package_information = %package.name,
                    "following import moniker"
                );

                let (remote, _) = self
                    .lookup_moniker(ctx, &at.document, moniker, Model::Reference, Pagination::default())
                    .await?;
                locations.extend(remote);

                let cursor = ReferenceCursor {
                    dump_id: database.dump().id,
                    scheme: moniker.scheme.clone(),
                    identifier: moniker.identifier.clone(),
                    name: package.name.clone(),
                    version: package.version.clone(),
                    phase: CursorPhase::SameRepo,
                    offset: 0,
                };
                let (remote_locations, next_cursor) = self
                    .resolve_page(ctx, request.repository_id, &request.commit, limit, cursor)
                    .await?;
                locations.extend(remote_locations);

                return Ok(ReferencesPage {
                    locations: dedup_locations(locations),
                    cursor: next_cursor,
                });
            }
        }

        Ok(ReferencesPage {
            locations: dedup_locations(locations),
            cursor: None,
        })
    }

    async fn resume_references(
        &self,
        ctx: &RequestContext,
        request: &ReferencesRequest,
        limit: u64,
        cursor: ReferenceCursor,
    ) -> Result<ReferencesPage> {
        // The dump the cursor references may have been deleted between
        // requests; that ends the result set rather than erroring.
        if self.metadata.dump_by_id(cursor.dump_id).await?.is_none() {
            tracing::debug!(
                target = "quarry.backend",
                dump_id = %cursor.dump_id,
                "cursor references a deleted dump"
            );
            return Ok(ReferencesPage::default());
        }

        let (locations, next_cursor) = self
            .resolve_page(ctx, request.repository_id, &request.commit, limit, cursor)
            .await?;
        Ok(ReferencesPage {
            locations: dedup_locations(locations),
            cursor: next_cursor,
        })
    }

    /// Steps 2–4 of the definition pipeline, against an already-resolved
    /// dump. Shared with the hover fallback.
    async fn definitions_in(
        &self,
        ctx: &RequestContext,
        database: &Database,
        path_in_db: &str,
        position: Position,
    ) -> Result<Vec<InternalLocation>> {
        let local = database.definitions(ctx, path_in_db, position).await?;
        if !local.is_empty() {
            return Ok(local);
        }

        let Some(at) = database.ranges_by_position(ctx, path_in_db, position).await? else {
            return Ok(Vec::new());
        };

        for range in &at.ranges {
            for moniker in monikers_for_range(&at.document, range)? {
                let (locations, _) = if moniker.kind == MonikerKind::Import {
                    self.lookup_moniker(
                        ctx,
                        &at.document,
                        &moniker,
                        Model::Definition,
                        Pagination::default(),
                    )
                    .await?
                } else {
                    database
                        .moniker_results(
                            ctx,
                            Model::Definition,
                            &moniker.scheme,
                            &moniker.identifier,
                            Pagination::default(),
                        )
                        .await?
                };
                if !locations.is_empty() {
                    return Ok(locations);
                }
            }
        }
        Ok(Vec::new())
    }

    /// Resolves an import moniker through package metadata into its home
    /// dump and queries that dump's moniker table.
    async fn lookup_moniker(
        &self,
        ctx: &RequestContext,
        document: &DocumentData,
        moniker: &Moniker,
        model: Model,
        pagination: Pagination,
    ) -> Result<(Vec<InternalLocation>, u64)> {
        let Some(package) = package_information(document, moniker) else {
            return Ok((Vec::new(), 0));
        };
        let Some(package_dump) = self
            .metadata
            .package(&moniker.scheme, &package.name, package.version.as_deref())
            .await?
        else {
            return Ok((Vec::new(), 0));
        };
        tracing::debug!(
            target = "quarry.backend",
            moniker = %moniker.identifier,
            package_information = %package.name,
            dump_id = %package_dump.id,
            "resolved package dump"
        );
        let database = self.database(package_dump);
        Ok(database
            .moniker_results(ctx, model, &moniker.scheme, &moniker.identifier, pagination)
            .await?)
    }

    /// Picks the dump a positional query runs against, and the query path
    /// relative to that dump's root.
    async fn resolve_database(
        &self,
        ctx: &RequestContext,
        repository_id: RepoId,
        commit: &str,
        path: &str,
        dump_id: Option<DumpId>,
    ) -> Result<(Database, String)> {
        if let Some(id) = dump_id {
            // The caller asserts validity; no exists check.
            let dump = self.metadata.dump_by_id(id).await?.ok_or_else(|| {
                QueryError::NoDumpFound {
                    repository_id,
                    commit: commit.to_owned(),
                    path: path.to_owned(),
                }
            })?;
            let path_in_db = dump.path_in_dump(path).ok_or_else(|| {
                QueryError::internal(format!("dump {id} does not cover {path}"))
            })?;
            return Ok((self.database(dump), path_in_db));
        }

        let mut databases = self.closest_databases(ctx, repository_id, commit, path).await?;
        if databases.is_empty() {
            tracing::warn!(
                target = "quarry.backend",
                repository_id = %repository_id,
                commit,
                path,
                "no dump found"
            );
            return Err(QueryError::NoDumpFound {
                repository_id,
                commit: commit.to_owned(),
                path: path.to_owned(),
            });
        }
        Ok(databases.remove(0))
    }

    /// All dumps near `commit` whose root covers `path` and which actually
    /// contain the document, in metadata-store order (nearest commit first).
    async fn closest_databases(
        &self,
        ctx: &RequestContext,
        repository_id: RepoId,
        commit: &str,
        path: &str,
    ) -> Result<Vec<(Database, String)>> {
        ctx.check_cancelled()?;
        let dumps = self
            .metadata
            .find_closest_dumps(repository_id, commit, path)
            .await?;

        let candidates: Vec<(Database, String)> = dumps
            .into_iter()
            .filter_map(|dump| {
                let path_in_db = dump.path_in_dump(path)?;
                tracing::debug!(
                    target = "quarry.backend",
                    closest_commit = %dump.commit,
                    dump_id = %dump.id,
                    "candidate dump"
                );
                Some((self.database(dump), path_in_db))
            })
            .collect();

        // The filter fans out; input order is preserved by joining in order.
        let checks = candidates
            .iter()
            .map(|(database, path_in_db)| database.exists(ctx, path_in_db));
        let results = futures::future::join_all(checks).await;
        let exists = collapse(ctx, results)?;

        Ok(candidates
            .into_iter()
            .zip(exists)
            .filter_map(|(candidate, exists)| exists.then_some(candidate))
            .collect())
    }

    pub(crate) fn database(&self, dump: Dump) -> Database {
        Database::new(Arc::clone(&self.caches), Arc::clone(&self.provider), dump)
    }

    pub(crate) fn metadata(&self) -> &dyn MetadataStore {
        self.metadata.as_ref()
    }

    async fn resolve_page(
        &self,
        ctx: &RequestContext,
        repository_id: RepoId,
        commit: &str,
        limit: u64,
        cursor: ReferenceCursor,
    ) -> Result<(Vec<InternalLocation>, Option<ReferenceCursor>)> {
        crate::pagination::resolve_page(self, ctx, repository_id, commit, limit, cursor).await
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Drops later duplicates, by `(dump id, path, range)` value equality,
/// keeping first-occurrence order.
fn dedup_locations(locations: Vec<InternalLocation>) -> Vec<InternalLocation> {
    let mut seen = HashSet::with_capacity(locations.len());
    locations
        .into_iter()
        .filter(|location| seen.insert(location.clone()))
        .collect()
}

/// The monikers attached to `range`, in priority order.
fn monikers_for_range(document: &DocumentData, range: &RangeData) -> Result<Vec<Moniker>> {
    let mut monikers = Vec::with_capacity(range.moniker_ids.len());
    for id in &range.moniker_ids {
        let moniker = document.monikers.get(id).ok_or_else(|| {
            QueryError::internal(format!("range references missing moniker {id}"))
        })?;
        monikers.push(moniker.clone());
    }
    sort_monikers(&mut monikers);
    Ok(monikers)
}

fn package_information<'a>(
    document: &'a DocumentData,
    moniker: &Moniker,
) -> Option<&'a PackageInformation> {
    document
        .package_information
        .get(&moniker.package_information_id?)
}

/// Joins fan-out results: a cancellation observed anywhere wins, otherwise
/// the first non-cancellation error fails the aggregate and successful
/// sub-queries contribute nothing.
pub(crate) fn collapse<T>(
    ctx: &RequestContext,
    results: Vec<std::result::Result<T, quarry_dump::DumpError>>,
) -> Result<Vec<T>> {
    ctx.check_cancelled()?;
    let mut values = Vec::with_capacity(results.len());
    let mut cancelled = false;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) if err.is_cancelled() => cancelled = true,
            Err(err) => return Err(err.into()),
        }
    }
    if cancelled {
        return Err(quarry_core::Cancelled.into());
    }
    Ok(values)
}
