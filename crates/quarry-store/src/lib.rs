//! SQLite-backed dump store.
//!
//! Dumps land on disk as SQLite files written by the ingestion pipeline:
//!
//! - `meta(num_result_chunks)` — one row
//! - `documents(path, data)` — JSON document payloads keyed by
//!   dump-root-relative path
//! - `result_chunks(id, data)` — JSON result-chunk payloads keyed by chunk
//!   index
//! - `definitions` / `"references"` — denormalized moniker tables with
//!   `(scheme, identifier, document_path, start/end positions)`
//!
//! The reader side is strictly read-only: files are opened with
//! `SQLITE_OPEN_READ_ONLY` and a single serialized connection per dump.
//! Statements run on the blocking thread pool so queries never stall the
//! async runtime.

mod provider;
mod store;

pub use provider::SqliteProvider;
pub use store::SqliteStore;
