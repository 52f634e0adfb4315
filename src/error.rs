//! Error taxonomy for the sync core.
//!
//! Remote failures are classified per item and folded into the
//! [`SyncReport`](crate::models::SyncReport). Store and provider failures
//! abort the whole pass.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single remote index call.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Rate limiting, timeouts, connection resets, 5xx. Retried within the pass.
    #[error("transient remote error: {message}")]
    Transient {
        message: String,
        /// Server-provided hint (`Retry-After`), used instead of the backoff delay.
        retry_after: Option<Duration>,
    },

    /// Oversized or invalid content, authorization failures. Not retried.
    #[error("permanent remote error: {0}")]
    Permanent(String),
}

impl RemoteError {
    pub fn transient(message: impl Into<String>) -> Self {
        RemoteError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        RemoteError::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient { .. })
    }
}

/// Terminal failure of a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The note source could not produce a snapshot. No remote mutation happened.
    #[error("note extraction failed: {0:#}")]
    Provider(#[source] anyhow::Error),

    /// The fingerprint store is unavailable or corrupt.
    #[error("fingerprint store error: {0:#}")]
    Store(#[source] anyhow::Error),

    /// The snapshot would delete an implausible share of tracked notes.
    #[error(
        "refusing to delete {deletions} of {tracked} tracked notes; \
         the snapshot looks incomplete (re-run with --allow-mass-delete to proceed)"
    )]
    SuspiciousSnapshot { deletions: usize, tracked: usize },

    /// A dispatched worker task panicked or was aborted.
    #[error("sync worker failed: {0}")]
    Worker(String),
}
