//! Reconciliation planner.
//!
//! Diffs a fresh snapshot against the fingerprint store and produces the
//! minimal [`ChangeSet`]. [`diff`] is pure; [`plan`] only adds the store read.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::error::SyncError;
use crate::fingerprint::content_hash;
use crate::models::{ChangeSet, FingerprintRecord, NoteSnapshot, PlannedNote, PlannedUpdate};
use crate::store::FingerprintStore;

/// Thresholds for rejecting snapshots that look truncated.
#[derive(Debug, Clone, Copy)]
pub struct DeletionGuard {
    /// Largest share of tracked notes one pass may delete.
    pub max_delete_fraction: f64,
    /// The fraction check only applies once this many notes are tracked.
    pub min_tracked: usize,
}

impl Default for DeletionGuard {
    fn default() -> Self {
        Self {
            max_delete_fraction: 0.5,
            min_tracked: 10,
        }
    }
}

/// Read every record from `store` and diff it against `snapshot`.
pub async fn plan(
    snapshot: Vec<NoteSnapshot>,
    store: &dyn FingerprintStore,
) -> Result<ChangeSet, SyncError> {
    let records = store.list().await.map_err(SyncError::Store)?;
    Ok(diff(snapshot, records))
}

/// Classify every identifier from the snapshot and the stored records.
///
/// - no record, or a record without a remote file → addition
/// - record whose hash differs, or whose last mutation failed → update
/// - record whose hash matches and is synced → unchanged
/// - record with no snapshot note → deletion
pub fn diff(snapshot: Vec<NoteSnapshot>, records: Vec<FingerprintRecord>) -> ChangeSet {
    let mut changes = ChangeSet::default();

    // Last write wins when the source repeats an identifier.
    let mut notes: BTreeMap<String, NoteSnapshot> = BTreeMap::new();
    let mut seen_twice: HashSet<String> = HashSet::new();
    for note in snapshot {
        if let Some(previous) = notes.insert(note.local_id.clone(), note) {
            if seen_twice.insert(previous.local_id.clone()) {
                warn!(local_id = %previous.local_id, "note source yielded duplicate identifier");
            }
            changes.duplicates.push(previous.local_id);
        }
    }

    changes.tracked = records.len();
    let mut stored: BTreeMap<String, FingerprintRecord> = records
        .into_iter()
        .map(|r| (r.local_id.clone(), r))
        .collect();

    for (local_id, note) in notes {
        let hash = content_hash(&note.title, &note.body);
        let planned = PlannedNote {
            note,
            content_hash: hash,
        };

        match stored.remove(&local_id) {
            None => changes.additions.push(planned),
            Some(record) if record.remote_file_id.is_none() => changes.additions.push(planned),
            Some(record) if record.content_hash != planned.content_hash || !record.is_current() => {
                changes.updates.push(PlannedUpdate {
                    planned,
                    previous: record,
                })
            }
            Some(_) => changes.unchanged.push(local_id),
        }
    }

    // Whatever is left in the store has no note in the snapshot.
    changes.deletions.extend(stored.into_values());

    changes
}

/// Reject a change set that would delete an implausible share of the store.
pub fn check_deletions(changes: &ChangeSet, guard: DeletionGuard) -> Result<(), SyncError> {
    let deletions = changes.deletions.len();
    let tracked = changes.tracked;
    if deletions == 0 {
        return Ok(());
    }

    let snapshot_empty = changes.additions.is_empty()
        && changes.updates.is_empty()
        && changes.unchanged.is_empty();

    let too_many = tracked >= guard.min_tracked
        && (deletions as f64 / tracked as f64) > guard.max_delete_fraction;

    if snapshot_empty || too_many {
        return Err(SyncError::SuspiciousSnapshot { deletions, tracked });
    }
    Ok(())
}
