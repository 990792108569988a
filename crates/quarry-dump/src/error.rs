//! Error types for the per-dump reader.

use quarry_core::Cancelled;

pub type Result<T> = std::result::Result<T, DumpError>;

/// Errors produced by a dump store backend.
///
/// These are `Clone` so single-flight cache loads can hand the leader's
/// failure to every waiter; message strings are carried instead of source
/// errors for the same reason.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o error: {message}")]
    Io { message: String },

    #[error("malformed dump payload: {message}")]
    Decode { message: String },

    /// Transient failure talking to the store. Propagated unchanged; the
    /// core never retries.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Errors produced by [`Database`](crate::Database) operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DumpError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// An invariant of the dump format was violated, e.g. a range referring
    /// to a moniker id its document does not declare.
    #[error("corrupt dump: {message}")]
    Internal { message: String },
}

impl DumpError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(target = "quarry.dump", %message, "dump invariant violated");
        Self::Internal { message }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
