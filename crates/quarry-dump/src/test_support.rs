//! In-memory dump fixtures shared by this crate's and the backend's tests.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use quarry_core::{
    DocumentId, Dump, DumpId, HoverResultId, Moniker, MonikerId, MonikerKind,
    PackageInformation, PackageInformationId, Position, Range, RangeId, RepoId, ResultId,
};

use crate::error::StoreError;
use crate::store::{DumpStore, StoreProvider};
use crate::types::{DocumentData, Model, MonikerRow, Pagination, RangeData, ResultChunkData};

pub fn range(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Range {
    Range::new(
        Position::new(start_line, start_char),
        Position::new(end_line, end_char),
    )
}

pub fn dump(id: u64, repository_id: i64, commit: &str, root: &str) -> Dump {
    Dump {
        id: DumpId::new(id),
        repository_id: RepoId::new(repository_id),
        commit: commit.to_owned(),
        root: root.to_owned(),
        filename: format!("dump-{id}.db"),
    }
}

pub fn moniker(kind: MonikerKind, scheme: &str, identifier: &str) -> Moniker {
    Moniker {
        kind,
        scheme: scheme.to_owned(),
        identifier: identifier.to_owned(),
        package_information_id: None,
    }
}

/// Builds one document's payload.
#[derive(Default)]
pub struct DocumentBuilder {
    document: DocumentData,
}

impl DocumentBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn range(mut self, id: u64, data: RangeData) -> Self {
        self.document.ranges.insert(RangeId::new(id), data);
        self
    }

    #[must_use]
    pub fn hover(mut self, id: u64, text: &str) -> Self {
        self.document
            .hover_results
            .insert(HoverResultId::new(id), text.to_owned());
        self
    }

    #[must_use]
    pub fn moniker(mut self, id: u64, moniker: Moniker) -> Self {
        self.document.monikers.insert(MonikerId::new(id), moniker);
        self
    }

    #[must_use]
    pub fn package_information(mut self, id: u64, name: &str, version: Option<&str>) -> Self {
        self.document.package_information.insert(
            PackageInformationId::new(id),
            PackageInformation {
                name: name.to_owned(),
                version: version.map(str::to_owned),
            },
        );
        self
    }

    #[must_use]
    pub fn build(self) -> DocumentData {
        self.document
    }
}

/// A plain range with the given result ids attached.
#[must_use]
pub fn range_data(
    range: Range,
    definition_result_id: Option<u64>,
    reference_result_id: Option<u64>,
    hover_result_id: Option<u64>,
    moniker_ids: &[u64],
) -> RangeData {
    RangeData {
        range,
        definition_result_id: definition_result_id.map(ResultId::new),
        reference_result_id: reference_result_id.map(ResultId::new),
        hover_result_id: hover_result_id.map(HoverResultId::new),
        moniker_ids: moniker_ids.iter().copied().map(MonikerId::new).collect(),
    }
}

/// An in-memory [`DumpStore`] assembled by [`FakeStoreBuilder`].
#[derive(Debug, Default)]
pub struct FakeStore {
    documents: HashMap<String, DocumentData>,
    chunks: Vec<ResultChunkData>,
    definitions: Vec<MonikerRow>,
    references: Vec<MonikerRow>,
}

#[derive(Debug, Default)]
pub struct FakeStoreBuilder {
    documents: HashMap<String, DocumentData>,
    results: HashMap<ResultId, Vec<(String, RangeId)>>,
    definitions: Vec<MonikerRow>,
    references: Vec<MonikerRow>,
    chunk_count: u64,
}

impl FakeStoreBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_count: 2,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn chunk_count(mut self, count: u64) -> Self {
        self.chunk_count = count;
        self
    }

    #[must_use]
    pub fn document(mut self, path: &str, document: DocumentData) -> Self {
        self.documents.insert(path.to_owned(), document);
        self
    }

    /// Registers the `(document path, range id)` pairs a result id resolves
    /// to.
    #[must_use]
    pub fn result(mut self, id: u64, pairs: &[(&str, u64)]) -> Self {
        self.results.insert(
            ResultId::new(id),
            pairs
                .iter()
                .map(|(path, range_id)| ((*path).to_owned(), RangeId::new(*range_id)))
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn moniker_row(mut self, model: Model, row: MonikerRow) -> Self {
        match model {
            Model::Definition => self.definitions.push(row),
            Model::Reference => self.references.push(row),
        }
        self
    }

    #[must_use]
    pub fn build(self) -> FakeStore {
        let chunk_count = self.chunk_count.max(1) as usize;
        let mut chunks = vec![ResultChunkData::default(); chunk_count];

        // Assign stable document ids across the whole store, as a writer
        // would.
        let mut paths: Vec<&String> = self
            .results
            .values()
            .flatten()
            .map(|(path, _)| path)
            .collect();
        paths.sort();
        paths.dedup();
        let ids: HashMap<&String, DocumentId> = paths
            .iter()
            .enumerate()
            .map(|(i, path)| (*path, DocumentId::new(i as u64 + 1)))
            .collect();

        for (result_id, pairs) in &self.results {
            let chunk = &mut chunks[(result_id.to_raw() % chunk_count as u64) as usize];
            let mut encoded = Vec::with_capacity(pairs.len());
            for (path, range_id) in pairs {
                let document_id = ids[path];
                chunk
                    .document_paths
                    .insert(document_id, path.clone());
                encoded.push((document_id, *range_id));
            }
            chunk.document_id_range_ids.insert(*result_id, encoded);
        }

        FakeStore {
            documents: self.documents,
            chunks,
            definitions: self.definitions,
            references: self.references,
        }
    }
}

impl DumpStore for FakeStore {
    fn contains_document<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        async move { Ok(self.documents.contains_key(path)) }.boxed()
    }

    fn document<'a>(
        &'a self,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Option<DocumentData>, StoreError>> {
        async move { Ok(self.documents.get(path).cloned()) }.boxed()
    }

    fn result_chunk_count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        async move { Ok(self.chunks.len() as u64) }.boxed()
    }

    fn result_chunk(
        &self,
        index: u64,
    ) -> BoxFuture<'_, Result<Option<ResultChunkData>, StoreError>> {
        async move { Ok(self.chunks.get(index as usize).cloned()) }.boxed()
    }

    fn moniker_rows<'a>(
        &'a self,
        model: Model,
        scheme: &'a str,
        identifier: &'a str,
        pagination: Pagination,
    ) -> BoxFuture<'a, Result<(Vec<MonikerRow>, u64), StoreError>> {
        async move {
            let table = match model {
                Model::Definition => &self.definitions,
                Model::Reference => &self.references,
            };
            let matching: Vec<&MonikerRow> = table
                .iter()
                .filter(|row| row.scheme == scheme && row.identifier == identifier)
                .collect();
            let total = matching.len() as u64;
            let skip = pagination.skip.unwrap_or(0) as usize;
            let rows = matching
                .into_iter()
                .skip(skip)
                .take(pagination.take.map_or(usize::MAX, |take| take as usize))
                .cloned()
                .collect();
            Ok((rows, total))
        }
        .boxed()
    }
}

/// A [`StoreProvider`] over a fixed set of in-memory stores, keyed by
/// filename. Opening an unknown filename fails the way a missing file would.
#[derive(Debug, Default)]
pub struct FakeProvider {
    stores: std::sync::Mutex<HashMap<String, Arc<FakeStore>>>,
    opens: std::sync::atomic::AtomicUsize,
}

impl FakeProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, filename: &str, store: FakeStore) {
        self.stores
            .lock()
            .unwrap()
            .insert(filename.to_owned(), Arc::new(store));
    }

    #[must_use]
    pub fn with_store(self, filename: &str, store: FakeStore) -> Self {
        self.insert(filename, store);
        self
    }

    /// How many times a store was opened (i.e. missed the connection cache).
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl StoreProvider for FakeProvider {
    fn open<'a>(
        &'a self,
        filename: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn DumpStore>, StoreError>> {
        async move {
            self.opens
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let store = self
                .stores
                .lock()
                .unwrap()
                .get(filename)
                .cloned()
                .ok_or_else(|| StoreError::Io {
                    message: format!("no such dump file: {filename}"),
                })?;
            Ok(store as Arc<dyn DumpStore>)
        }
        .boxed()
    }
}
