//! Decoded dump payloads and the value types queries produce.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use quarry_cache::EntryCost;
use quarry_core::{
    DocumentId, Dump, HoverResultId, Moniker, MonikerId, PackageInformation,
    PackageInformationId, Range, RangeId, ResultId,
};

/// A decoded document payload: the ranges of one file plus the moniker and
/// package-information records they refer to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    pub ranges: HashMap<RangeId, RangeData>,
    pub hover_results: HashMap<HoverResultId, String>,
    pub monikers: HashMap<MonikerId, Moniker>,
    pub package_information: HashMap<PackageInformationId, PackageInformation>,
}

impl DocumentData {
    /// All ranges covering `position`, innermost first.
    #[must_use]
    pub fn ranges_at(&self, position: quarry_core::Position) -> Vec<RangeData> {
        let mut covering: Vec<RangeData> = self
            .ranges
            .values()
            .filter(|r| r.range.contains(position))
            .cloned()
            .collect();
        covering.sort_by(|a, b| {
            a.range
                .extent()
                .cmp(&b.range.extent())
                .then(a.range.start.cmp(&b.range.start))
        });
        covering
    }
}

impl EntryCost for DocumentData {
    fn cost(&self) -> u64 {
        (self.ranges.len()
            + self.hover_results.len()
            + self.monikers.len()
            + self.package_information.len()) as u64
    }
}

/// One source range and the result ids attached to it. Immutable once
/// decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeData {
    pub range: Range,
    pub definition_result_id: Option<ResultId>,
    pub reference_result_id: Option<ResultId>,
    pub hover_result_id: Option<HoverResultId>,
    pub moniker_ids: Vec<MonikerId>,
}

/// A decoded result chunk: a page of the dump's result table.
///
/// Result entries refer to documents by a compact numeric id; the chunk
/// carries the id → path table needed to resolve them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultChunkData {
    pub document_paths: HashMap<DocumentId, String>,
    pub document_id_range_ids: HashMap<ResultId, Vec<(DocumentId, RangeId)>>,
}

impl EntryCost for ResultChunkData {
    fn cost(&self) -> u64 {
        (self.document_paths.len()
            + self
                .document_id_range_ids
                .values()
                .map(Vec::len)
                .sum::<usize>()) as u64
    }
}

/// Which moniker table a lookup scans.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Model {
    Definition,
    Reference,
}

/// One row of a dump's definitions or references table: a symbol occurrence
/// addressed by `(scheme, identifier)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonikerRow {
    pub scheme: String,
    pub identifier: String,
    /// Dump-root-relative document path.
    pub path: String,
    pub range: Range,
}

/// Skip/take window for large symbol sets.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

/// A resolved location in some dump, with a repository-relative path.
///
/// Equality (and therefore deduplication) is by `(dump id, path, range)`:
/// two queries that land on the same spot in the same dump are the same
/// location, regardless of which commit or root metadata rode along.
#[derive(Debug, Clone)]
pub struct InternalLocation {
    pub dump: Dump,
    pub path: String,
    pub range: Range,
}

impl PartialEq for InternalLocation {
    fn eq(&self, other: &Self) -> bool {
        self.dump.id == other.dump.id && self.path == other.path && self.range == other.range
    }
}

impl Eq for InternalLocation {}

impl Hash for InternalLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dump.id.hash(state);
        self.path.hash(state);
        self.range.hash(state);
    }
}

/// Hover markup plus the range that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverContent {
    pub text: String,
    pub range: Range,
}

/// The ranges covering a position, innermost first, along with the decoded
/// document so callers can resolve moniker ids without re-reading.
#[derive(Debug, Clone)]
pub struct RangesAtPosition {
    pub document: std::sync::Arc<DocumentData>,
    pub ranges: Vec<RangeData>,
}
