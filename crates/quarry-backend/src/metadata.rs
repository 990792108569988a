//! The relational metadata store the backend consumes.
//!
//! The store holds dump records and package/dependency rows maintained by
//! the ingestion pipeline. The backend only reads it, through this trait;
//! the implementation (and its schema) lives elsewhere.

use futures::future::BoxFuture;

use quarry_core::{Dump, DumpId, RepoId};
use quarry_dump::StoreError;

/// Parameters for a package-scoped reference lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReferencesRequest {
    pub repository_id: RepoId,
    pub commit: String,
    pub scheme: String,
    pub name: String,
    pub version: Option<String>,
    pub identifier: String,
    pub limit: u64,
    pub offset: u64,
}

/// One page of dumps that depend on a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencePage {
    /// Dumps whose dependency rows match the request, in store order.
    pub dumps: Vec<Dump>,
    /// Total matching dumps across all pages.
    pub total_count: u64,
    /// Offset to resume from for the next page.
    pub new_offset: u64,
}

pub trait MetadataStore: Send + Sync + 'static {
    /// Dumps whose commit is nearest to `commit` (nearest first) and whose
    /// root is a path prefix of `path`.
    fn find_closest_dumps<'a>(
        &'a self,
        repository_id: RepoId,
        commit: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Dump>, StoreError>>;

    fn dump_by_id(&self, id: DumpId) -> BoxFuture<'_, Result<Option<Dump>, StoreError>>;

    /// The dump that provides `(scheme, name, version)`, if the package is
    /// indexed.
    fn package<'a>(
        &'a self,
        scheme: &'a str,
        name: &'a str,
        version: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Option<Dump>, StoreError>>;

    /// Dumps in *other* repositories depending on the package.
    fn references<'a>(
        &'a self,
        request: &'a PackageReferencesRequest,
    ) -> BoxFuture<'a, Result<ReferencePage, StoreError>>;

    /// Dumps in the *same* repository (at other commits or roots) depending
    /// on the package.
    fn same_repo_remote_references<'a>(
        &'a self,
        request: &'a PackageReferencesRequest,
    ) -> BoxFuture<'a, Result<ReferencePage, StoreError>>;
}
