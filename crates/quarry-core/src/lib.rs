//! Shared, dependency-minimized core types used across Quarry.

pub mod context;
pub mod dump;
pub mod id;
pub mod moniker;
pub mod path;
pub mod text;

pub use context::{Cancelled, RequestContext};
pub use dump::Dump;
pub use id::*;
pub use moniker::{sort_monikers, Moniker, MonikerKind, PackageInformation};
pub use path::{path_in_dump, path_in_repo};
pub use text::{Position, Range};

/// The current Quarry version.
///
/// Recorded alongside persisted artifacts for compatibility checks.
pub const QUARRY_VERSION: &str = env!("CARGO_PKG_VERSION");
