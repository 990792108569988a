//! The two-phase remote-reference state machine.
//!
//! A reference query that escapes its dump pages through every other dump
//! depending on the same package: first dumps of the same repository
//! (`same-repo`), then dumps of other repositories (`remote-repo`). The
//! cursor records the phase and the offset into the metadata store's
//! dependency rows; the machine is terminal when it produces no new cursor.
//!
//! Empty pages are never returned to the client while a cursor remains: the
//! machine advances until it finds locations or terminates ("skip empty
//! pages"). Progress is guaranteed because every step either grows the
//! offset, switches phase, or terminates.
//!
//! Duplicates *across* pages are possible: the initial page's local
//! moniker-table hits can reappear when a remote dump indexes the same
//! tree. Suppressing them would require remembering every location ever
//! returned for the lifetime of a cursor, which is unbounded; clients merge
//! by location identity instead.

use quarry_core::{Dump, RepoId, RequestContext};
use quarry_dump::{InternalLocation, Model, Pagination};

use crate::backend::{collapse, Backend};
use crate::cursor::{CursorPhase, ReferenceCursor};
use crate::error::Result;
use crate::metadata::PackageReferencesRequest;

/// Drives the machine from `cursor` until a non-empty page or termination.
pub(crate) async fn resolve_page(
    backend: &Backend,
    ctx: &RequestContext,
    repository_id: RepoId,
    commit: &str,
    limit: u64,
    mut cursor: ReferenceCursor,
) -> Result<(Vec<InternalLocation>, Option<ReferenceCursor>)> {
    loop {
        let (locations, next) =
            resolve_page_once(backend, ctx, repository_id, commit, limit, &cursor).await?;
        match next {
            Some(next) if locations.is_empty() => {
                // A page that neither yields locations nor advances would
                // loop forever; that only happens when the metadata store
                // violates its offset contract. Stop instead.
                if next.phase == cursor.phase && next.offset == cursor.offset {
                    tracing::warn!(
                        target = "quarry.backend",
                        phase = ?cursor.phase,
                        offset = cursor.offset,
                        "pagination made no progress; terminating"
                    );
                    return Ok((locations, None));
                }
                cursor = next;
            }
            next => return Ok((locations, next)),
        }
    }
}

async fn resolve_page_once(
    backend: &Backend,
    ctx: &RequestContext,
    repository_id: RepoId,
    commit: &str,
    limit: u64,
    cursor: &ReferenceCursor,
) -> Result<(Vec<InternalLocation>, Option<ReferenceCursor>)> {
    ctx.check_cancelled()?;

    let request = package_request(repository_id, commit, cursor, limit, cursor.offset);
    let page = match cursor.phase {
        CursorPhase::SameRepo => {
            backend
                .metadata()
                .same_repo_remote_references(&request)
                .await?
        }
        CursorPhase::RemoteRepo => backend.metadata().references(&request).await?,
    };
    tracing::debug!(
        target = "quarry.backend",
        package_references = page.total_count,
        phase = ?cursor.phase,
        offset = cursor.offset,
        returned = page.dumps.len(),
        "remote reference page"
    );

    // The dump the query started in already contributed its local results.
    let dumps: Vec<Dump> = page
        .dumps
        .into_iter()
        .filter(|dump| dump.id != cursor.dump_id)
        .collect();

    let queries = dumps.into_iter().map(|dump| {
        let database = backend.database(dump);
        async move {
            database
                .moniker_results(
                    ctx,
                    Model::Reference,
                    &cursor.scheme,
                    &cursor.identifier,
                    Pagination::default(),
                )
                .await
                .map(|(locations, _)| locations)
        }
    });
    let results = futures::future::join_all(queries).await;
    let locations: Vec<InternalLocation> =
        collapse(ctx, results)?.into_iter().flatten().collect();

    let next = if page.new_offset < page.total_count {
        Some(ReferenceCursor {
            offset: page.new_offset,
            ..cursor.clone()
        })
    } else {
        match cursor.phase {
            CursorPhase::SameRepo => {
                // Same-repo scope exhausted; probe whether the remote phase
                // has anything before handing the client another cursor.
                has_remote_references(backend, ctx, repository_id, commit, cursor)
                    .await?
                    .then(|| ReferenceCursor {
                        phase: CursorPhase::RemoteRepo,
                        offset: 0,
                        ..cursor.clone()
                    })
            }
            CursorPhase::RemoteRepo => None,
        }
    };

    Ok((locations, next))
}

async fn has_remote_references(
    backend: &Backend,
    ctx: &RequestContext,
    repository_id: RepoId,
    commit: &str,
    cursor: &ReferenceCursor,
) -> Result<bool> {
    ctx.check_cancelled()?;
    let probe = package_request(repository_id, commit, cursor, 1, 0);
    let page = backend.metadata().references(&probe).await?;
    Ok(page.total_count > 0)
}

fn package_request(
    repository_id: RepoId,
    commit: &str,
    cursor: &ReferenceCursor,
    limit: u64,
    offset: u64,
) -> PackageReferencesRequest {
    PackageReferencesRequest {
        repository_id,
        commit: commit.to_owned(),
        scheme: cursor.scheme.clone(),
        name: cursor.name.clone(),
        version: cursor.version.clone(),
        identifier: cursor.identifier.clone(),
        limit,
        offset,
    }
}
