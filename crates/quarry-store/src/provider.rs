//! Filename-based opener for on-disk dumps.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use quarry_dump::{DumpStore, StoreError, StoreProvider};

use crate::store::SqliteStore;

/// Opens dump files beneath a fixed storage root.
///
/// Filenames come from dump records in the metadata store and are always
/// plain basenames; joining keeps reads inside the storage root.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    root: PathBuf,
}

impl SqliteProvider {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StoreProvider for SqliteProvider {
    fn open<'a>(
        &'a self,
        filename: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn DumpStore>, StoreError>> {
        let path = self.root.join(filename);
        async move {
            let store = tokio::task::spawn_blocking(move || SqliteStore::open(&path))
                .await
                .map_err(|err| StoreError::Unavailable {
                    message: format!("store open aborted: {err}"),
                })??;
            tracing::debug!(target = "quarry.store", filename, "opened dump");
            Ok(Arc::new(store) as Arc<dyn DumpStore>)
        }
        .boxed()
    }
}
