//! Error types for query resolution.

use quarry_core::{Cancelled, RepoId};
use quarry_dump::{DumpError, StoreError};

pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors surfaced by [`Backend`](crate::Backend) queries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// No dump covers the requested file at this commit: the system has no
    /// answer, which is different from an empty answer.
    #[error("no dump found for {path} in repository {repository_id} at {commit}")]
    NoDumpFound {
        repository_id: RepoId,
        commit: String,
        path: String,
    },

    #[error(transparent)]
    Dump(#[from] DumpError),

    /// The client presented a cursor this server did not mint (or minted
    /// under an incompatible wire version).
    #[error("invalid pagination cursor: {reason}")]
    CursorInvalid { reason: String },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        Self::Dump(DumpError::Store(err))
    }
}

impl QueryError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(target = "quarry.backend", %message, "query invariant violated");
        Self::Internal { message }
    }

    pub(crate) fn cursor_invalid(reason: impl Into<String>) -> Self {
        Self::CursorInvalid {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled(_) | Self::Dump(DumpError::Cancelled(_))
        )
    }
}
