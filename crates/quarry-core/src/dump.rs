//! Dump records handed to the query core by the metadata store.

use serde::{Deserialize, Serialize};

use crate::id::{DumpId, RepoId};

/// A read-only index bundle for a `(repository, commit, root)` triple.
///
/// Dumps are created by the ingestion pipeline and deleted externally; the
/// query core only ever reads them. `root` is the path prefix of the indexed
/// sub-tree (empty for whole-repository dumps) and `filename` locates the
/// on-disk bundle for the connection cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dump {
    pub id: DumpId,
    pub repository_id: RepoId,
    pub commit: String,
    pub root: String,
    pub filename: String,
}

impl Dump {
    /// Converts a repository-relative path to the form stored in this dump,
    /// or `None` when the path is outside the dump's root.
    #[must_use]
    pub fn path_in_dump(&self, path: &str) -> Option<String> {
        crate::path::path_in_dump(&self.root, path)
    }

    /// Converts a path stored in this dump back to repository-relative form.
    #[must_use]
    pub fn path_in_repo(&self, stored: &str) -> String {
        crate::path::path_in_repo(&self.root, stored)
    }
}
