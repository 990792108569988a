//! Query resolution over dumps: definitions, references and hover.
//!
//! The backend stitches the other layers together. For a query against
//! `(repository, commit, path, position)` it picks the dump(s) covering the
//! file, runs local lookups against the per-dump reader, follows cross-dump
//! moniker links through package metadata, and pages reference queries
//! across arbitrarily many remote dumps with an opaque cursor.
//!
//! The backend does not own the metadata store or the dump files; it is
//! constructed with handles to both and keeps only the shared caches.

mod backend;
mod config;
mod cursor;
mod error;
mod metadata;
mod pagination;

pub use backend::{Backend, ReferencesPage, ReferencesRequest};
pub use config::BackendConfig;
pub use cursor::{CursorPhase, ReferenceCursor};
pub use error::QueryError;
pub use metadata::{MetadataStore, PackageReferencesRequest, ReferencePage};
