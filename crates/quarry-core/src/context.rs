//! Canonical per-request context passed through the query layer.
//!
//! Cancellation is cooperative via [`CancellationToken`]: I/O layers check
//! the token between store reads, and fan-out joins consult it when
//! collapsing failures so a cancellation observed alongside other errors is
//! reported as [`Cancelled`] rather than the I/O error.

use tokio_util::sync::CancellationToken;

/// The request was cancelled before it completed.
///
/// Partial results are discarded; this takes precedence over store errors
/// that raced with the cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request cancelled")]
pub struct Cancelled;

/// Per-request context.
///
/// This type is intentionally small and `Clone` so callers can cheaply pass
/// it into fanned-out work. It never creates tracing spans of its own; the
/// caller's ambient span is the only one the core reports into.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `Err(Cancelled)` once the request has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.cancel.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Clone the context, but replace the cancellation token with a child
    /// token.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
        }
    }
}
