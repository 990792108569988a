//! Cross-dump symbol handles ("monikers") and their deterministic ordering.
//!
//! A moniker names a symbol in a way that survives crossing dump boundaries:
//! a scheme (which indexer or package ecosystem minted it), an identifier,
//! and a kind describing which side of a dependency edge it sits on. Import
//! monikers additionally point at the package-information record tying them
//! to a concrete dependency.

use serde::{Deserialize, Serialize};

use crate::id::PackageInformationId;

/// Which side of a dependency edge a moniker describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonikerKind {
    /// The symbol is consumed from another package.
    Import,
    /// The symbol is provided to other packages.
    Export,
    /// The symbol never leaves its dump.
    Local,
}

impl MonikerKind {
    /// Priority used by [`sort_monikers`]: imports resolve through package
    /// metadata and are the most precise, locals are the least.
    fn priority(self) -> u8 {
        match self {
            MonikerKind::Import => 0,
            MonikerKind::Export => 1,
            MonikerKind::Local => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Moniker {
    pub kind: MonikerKind,
    pub scheme: String,
    pub identifier: String,
    pub package_information_id: Option<PackageInformationId>,
}

/// The `(name, version)` metadata tying a moniker to a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageInformation {
    pub name: String,
    pub version: Option<String>,
}

/// Schemes we prefer when several monikers describe the same range, in
/// decreasing order of preference. Unknown schemes sort after these.
const SCHEME_ORDER: [&str; 6] = ["tsc", "npm", "gomod", "go", "maven", "pip"];

fn scheme_rank(scheme: &str) -> usize {
    SCHEME_ORDER
        .iter()
        .position(|s| *s == scheme)
        .unwrap_or(SCHEME_ORDER.len())
}

/// Sorts monikers into the priority order the resolver depends on: kind
/// first (import, export, local), then the fixed scheme preference, then
/// lexicographic scheme and identifier. The ordering is total, so sorting is
/// idempotent and independent of input order.
pub fn sort_monikers(monikers: &mut [Moniker]) {
    monikers.sort_by(|a, b| {
        a.kind
            .priority()
            .cmp(&b.kind.priority())
            .then_with(|| scheme_rank(&a.scheme).cmp(&scheme_rank(&b.scheme)))
            .then_with(|| a.scheme.cmp(&b.scheme))
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
}
