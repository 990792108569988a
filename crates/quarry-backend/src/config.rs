//! Backend configuration.

use quarry_dump::CacheCapacities;

/// Tunables for a [`Backend`](crate::Backend).
///
/// Callers populate this from their own configuration surface; the backend
/// never reads files or the environment.
#[derive(Debug, Clone, Copy)]
pub struct BackendConfig {
    /// Capacities for the connection / document / result-chunk caches.
    pub cache_capacities: CacheCapacities,

    /// How many remote dumps a single pagination step asks the metadata
    /// store for.
    pub remote_dump_limit: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cache_capacities: CacheCapacities::default(),
            remote_dump_limit: 20,
        }
    }
}
