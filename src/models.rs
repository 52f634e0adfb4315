//! Core data models used throughout Notes Harness.
//!
//! These types represent the notes pulled from a source, the fingerprints
//! persisted after each confirmed remote mutation, and the change sets and
//! reports that flow through a reconciliation pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One note as produced by a [`NoteSource`](crate::traits::NoteSource).
///
/// Snapshots are ephemeral: a fresh set is pulled on every sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSnapshot {
    /// Opaque identifier, stable across runs.
    pub local_id: String,
    pub title: String,
    pub body: String,
    /// Advisory only. Change detection is driven by the content hash.
    pub modified_at: DateTime<Utc>,
}

/// Per-note synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// A remote mutation is in flight.
    Pending,
    /// The remote backend acknowledged the last mutation.
    Synced,
    /// The last mutation failed; retried on the next pass.
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            "failed" => Ok(SyncState::Failed),
            other => anyhow::bail!("unknown sync state: '{}'", other),
        }
    }
}

/// What the fingerprint store remembers about a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintRecord {
    pub local_id: String,
    pub content_hash: String,
    /// Handle returned by the remote index. `None` until the first
    /// successful upload.
    pub remote_file_id: Option<String>,
    pub sync_state: SyncState,
    pub title: String,
    pub last_error: Option<String>,
    /// Unix seconds of the last write to this record.
    pub updated_at: i64,
}

impl FingerprintRecord {
    /// True when the remote index holds the content described by this record.
    pub fn is_current(&self) -> bool {
        self.sync_state == SyncState::Synced && self.remote_file_id.is_some()
    }
}

/// A snapshot note together with its computed content hash.
#[derive(Debug, Clone)]
pub struct PlannedNote {
    pub note: NoteSnapshot,
    pub content_hash: String,
}

/// A note whose content differs from (or failed to replace) its stored record.
#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    pub planned: PlannedNote,
    pub previous: FingerprintRecord,
}

/// Output of the reconciliation planner for one pass.
///
/// The four sets partition every `local_id` seen in the snapshot and the store.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub additions: Vec<PlannedNote>,
    pub updates: Vec<PlannedUpdate>,
    pub deletions: Vec<FingerprintRecord>,
    pub unchanged: Vec<String>,
    /// Identifiers the source yielded more than once (last one won).
    pub duplicates: Vec<String>,
    /// Number of records in the store when the plan was made.
    pub tracked: usize,
}

impl ChangeSet {
    pub fn is_noop(&self) -> bool {
        self.additions.is_empty() && self.updates.is_empty() && self.deletions.is_empty()
    }

    pub fn pending_mutations(&self) -> usize {
        self.additions.len() + self.updates.len() + self.deletions.len()
    }
}

/// Which remote mutation an item needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Addition,
    Update,
    Deletion,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Addition => "addition",
            ChangeKind::Update => "update",
            ChangeKind::Deletion => "deletion",
        };
        f.write_str(s)
    }
}

/// A per-item failure folded into the [`SyncReport`].
#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub local_id: String,
    pub kind: ChangeKind,
    pub reason: String,
    /// Permanent failures need the note fixed before they can succeed.
    pub permanent: bool,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub failures: Vec<FailedItem>,
    /// The pass was aborted between batches.
    pub cancelled: bool,
}

/// A dereferenceable reference back to the original note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalLocator {
    pub identifier: String,
    pub url: String,
}
