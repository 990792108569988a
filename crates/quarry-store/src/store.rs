//! Read-only SQLite access to one dump file.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use quarry_core::{Position, Range};
use quarry_dump::{
    DocumentData, DumpStore, Model, MonikerRow, Pagination, ResultChunkData, StoreError,
};

/// A [`DumpStore`] over one on-disk SQLite dump.
///
/// The connection is serialized behind a mutex: dumps are immutable, queries
/// are short point lookups, and one handle per dump keeps the connection
/// cache's accounting honest.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens `path` read-only.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_error)?;
        conn.busy_timeout(Duration::from_secs(30)).map_err(open_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `query` on the blocking pool with the connection locked.
    fn blocking<T, F>(&self, query: F) -> BoxFuture<'static, Result<T, StoreError>>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        async move {
            tokio::task::spawn_blocking(move || query(&lock_conn(&conn)))
                .await
                .map_err(|err| StoreError::Unavailable {
                    message: format!("store query aborted: {err}"),
                })?
        }
        .boxed()
    }
}

fn lock_conn(conn: &Arc<Mutex<Connection>>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|err| err.into_inner())
}

impl DumpStore for SqliteStore {
    fn contains_document<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        let path = path.to_owned();
        self.blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM documents WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()
                .map_err(query_error)?;
            Ok(found.is_some())
        })
    }

    fn document<'a>(
        &'a self,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Option<DocumentData>, StoreError>> {
        let path = path.to_owned();
        self.blocking(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM documents WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()
                .map_err(query_error)?;
            data.map(|bytes| decode_payload(&bytes, "document")).transpose()
        })
    }

    fn result_chunk_count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        self.blocking(|conn| {
            let count: i64 = conn
                .query_row("SELECT num_result_chunks FROM meta", [], |row| row.get(0))
                .map_err(query_error)?;
            Ok(count.max(0) as u64)
        })
    }

    fn result_chunk(
        &self,
        index: u64,
    ) -> BoxFuture<'_, Result<Option<ResultChunkData>, StoreError>> {
        self.blocking(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM result_chunks WHERE id = ?1",
                    params![index as i64],
                    |row| row.get(0),
                )
                .optional()
                .map_err(query_error)?;
            data.map(|bytes| decode_payload(&bytes, "result chunk")).transpose()
        })
    }

    fn moniker_rows<'a>(
        &'a self,
        model: Model,
        scheme: &'a str,
        identifier: &'a str,
        pagination: Pagination,
    ) -> BoxFuture<'a, Result<(Vec<MonikerRow>, u64), StoreError>> {
        let scheme = scheme.to_owned();
        let identifier = identifier.to_owned();
        self.blocking(move |conn| {
            let table = match model {
                Model::Definition => "definitions",
                Model::Reference => "\"references\"",
            };

            let total: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {table} WHERE scheme = ?1 AND identifier = ?2"
                    ),
                    params![scheme, identifier],
                    |row| row.get(0),
                )
                .map_err(query_error)?;

            let limit = pagination.take.map_or(-1, |take| take as i64);
            let offset = pagination.skip.unwrap_or(0) as i64;
            let mut statement = conn
                .prepare(&format!(
                    "SELECT document_path, start_line, start_character, end_line, end_character \
                     FROM {table} \
                     WHERE scheme = ?1 AND identifier = ?2 \
                     ORDER BY id \
                     LIMIT ?3 OFFSET ?4"
                ))
                .map_err(query_error)?;
            let rows = statement
                .query_map(params![scheme, identifier, limit, offset], |row| {
                    Ok(MonikerRow {
                        scheme: scheme.clone(),
                        identifier: identifier.clone(),
                        path: row.get(0)?,
                        range: Range::new(
                            Position::new(row.get(1)?, row.get(2)?),
                            Position::new(row.get(3)?, row.get(4)?),
                        ),
                    })
                })
                .map_err(query_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(query_error)?;

            Ok((rows, total.max(0) as u64))
        })
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
    what: &str,
) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|err| StoreError::Decode {
        message: format!("{what}: {err}"),
    })
}

fn open_error(err: rusqlite::Error) -> StoreError {
    StoreError::Io {
        message: err.to_string(),
    }
}

fn query_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(code, _)
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            StoreError::Unavailable {
                message: err.to_string(),
            }
        }
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            StoreError::Decode {
                message: err.to_string(),
            }
        }
        other => StoreError::Io {
            message: other.to_string(),
        },
    }
}
