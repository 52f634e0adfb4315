//! Batched remote sync executor.
//!
//! Applies a [`ChangeSet`] against a [`RemoteIndex`]:
//!
//! 1. Categories run in order: deletions, additions, updates.
//! 2. Within a category, items are dispatched in batches of at most
//!    `concurrency` tasks; each batch drains before the next is issued.
//! 3. Transient failures are retried with exponential backoff, up to
//!    `max_attempts` per item. Permanent failures are not retried.
//! 4. The fingerprint store is written once per item, on this task, only
//!    after the item's remote outcome is known.
//! 5. Cancellation is checked before every batch; in-flight calls drain.
//!
//! Per-item remote errors are folded into the [`SyncReport`]. Only store
//! failures (and worker panics) abort the pass, once the current batch has
//! drained.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError};
use crate::models::{
    ChangeKind, ChangeSet, FailedItem, FingerprintRecord, PlannedNote, PlannedUpdate, SyncReport,
    SyncState,
};
use crate::progress::{ApplyPhase, SyncProgressEvent, SyncProgressReporter};
use crate::remote::{render_document, RemoteIndex};
use crate::store::FingerprintStore;

/// Retry schedule for transient remote failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per remote call, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based; attempt 1 never waits).
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exp);
        hint.unwrap_or(backoff).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

/// Tunables for [`apply`].
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Bound on in-flight remote calls within a category.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl ApplyOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                base_delay: config.backoff_base(),
                max_delay: config.backoff_max(),
            },
        }
    }
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// One unit of remote work.
#[derive(Debug, Clone)]
enum WorkItem {
    Delete(FingerprintRecord),
    Add(PlannedNote),
    Update(PlannedUpdate),
}

impl WorkItem {
    fn local_id(&self) -> &str {
        match self {
            WorkItem::Delete(record) => &record.local_id,
            WorkItem::Add(planned) => &planned.note.local_id,
            WorkItem::Update(update) => &update.planned.note.local_id,
        }
    }

    fn kind(&self) -> ChangeKind {
        match self {
            WorkItem::Delete(_) => ChangeKind::Deletion,
            WorkItem::Add(_) => ChangeKind::Addition,
            WorkItem::Update(_) => ChangeKind::Update,
        }
    }
}

/// Remote result for one item. `Ok(Some(id))` carries the new file handle.
struct ItemOutcome {
    item: WorkItem,
    result: Result<Option<String>, RemoteError>,
}

/// Apply `changes` to `backend`, recording confirmed results in `store`.
pub async fn apply(
    changes: ChangeSet,
    backend: Arc<dyn RemoteIndex>,
    store: &dyn FingerprintStore,
    options: ApplyOptions,
    progress: &dyn SyncProgressReporter,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport {
        unchanged: changes.unchanged.len() as u64,
        duplicates: changes.duplicates.len() as u64,
        ..SyncReport::default()
    };

    let categories = [
        (
            ApplyPhase::Deleting,
            changes.deletions.into_iter().map(WorkItem::Delete).collect::<Vec<_>>(),
        ),
        (
            ApplyPhase::Adding,
            changes.additions.into_iter().map(WorkItem::Add).collect(),
        ),
        (
            ApplyPhase::Updating,
            changes.updates.into_iter().map(WorkItem::Update).collect(),
        ),
    ];

    let concurrency = options.concurrency.max(1);

    'categories: for (phase, items) in categories {
        let total = items.len() as u64;
        let mut done = 0u64;
        let mut pending = items.into_iter().peekable();

        while pending.peek().is_some() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break 'categories;
            }

            let mut batch = JoinSet::new();
            for item in pending.by_ref().take(concurrency) {
                let backend = Arc::clone(&backend);
                let retry = options.retry;
                batch.spawn(async move { execute(item, backend.as_ref(), retry).await });
            }

            // A fatal error still lets the rest of the batch finish, so no
            // remote call is cut off after it has already landed.
            let mut fatal: Option<SyncError> = None;
            while let Some(joined) = batch.join_next().await {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(error = %e, "sync worker failed");
                        fatal.get_or_insert(SyncError::Worker(e.to_string()));
                        continue;
                    }
                };
                if let Err(e) = record_outcome(outcome, store, &mut report).await {
                    warn!(error = %e, "store write failed, draining the current batch");
                    fatal.get_or_insert(e);
                    continue;
                }
                done += 1;
                progress.report(SyncProgressEvent::Applying {
                    phase,
                    n: done,
                    total,
                });
            }
            if let Some(e) = fatal {
                return Err(e);
            }
        }
    }

    if report.cancelled {
        progress.report(SyncProgressEvent::Cancelled);
        info!("sync pass cancelled between batches");
    }

    info!(
        added = report.added,
        updated = report.updated,
        removed = report.removed,
        unchanged = report.unchanged,
        failed = report.failed,
        "sync pass applied"
    );

    Ok(report)
}

/// Perform the remote side of one item. Never touches the store.
async fn execute(item: WorkItem, backend: &dyn RemoteIndex, retry: RetryPolicy) -> ItemOutcome {
    let result = match &item {
        WorkItem::Delete(record) => match &record.remote_file_id {
            Some(file_id) => with_retry(retry, &record.local_id, || backend.remove(file_id))
                .await
                .map(|_| None),
            // Never reached the remote index; nothing to remove there.
            None => Ok(None),
        },
        WorkItem::Add(planned) => index_note(planned, backend, retry).await.map(Some),
        WorkItem::Update(update) => {
            let local_id = &update.previous.local_id;
            let removed = match &update.previous.remote_file_id {
                Some(old) => with_retry(retry, local_id, || backend.remove(old)).await,
                None => Ok(()),
            };
            match removed {
                Ok(()) => index_note(&update.planned, backend, retry).await.map(Some),
                Err(e) => Err(e),
            }
        }
    };

    ItemOutcome { item, result }
}

async fn index_note(
    planned: &PlannedNote,
    backend: &dyn RemoteIndex,
    retry: RetryPolicy,
) -> Result<String, RemoteError> {
    let note = &planned.note;
    let document = render_document(&note.local_id, &note.title, &note.body);
    with_retry(retry, &note.local_id, || backend.index(&note.local_id, &document)).await
}

/// Run `call` until it succeeds, fails permanently, or attempts run out.
async fn with_retry<T, F, Fut>(retry: RetryPolicy, local_id: &str, mut call: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(RemoteError::Transient {
                message,
                retry_after,
            }) if attempt < max_attempts => {
                attempt += 1;
                let delay = retry.delay_for(attempt, retry_after);
                debug!(local_id, attempt, ?delay, %message, "retrying transient remote error");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Write the store for one finished item and fold it into the report.
async fn record_outcome(
    outcome: ItemOutcome,
    store: &dyn FingerprintStore,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    let now = chrono::Utc::now().timestamp();
    let kind = outcome.item.kind();
    let local_id = outcome.item.local_id().to_string();

    match (outcome.item, outcome.result) {
        (WorkItem::Delete(record), Ok(_)) => {
            store
                .remove(&record.local_id)
                .await
                .map_err(SyncError::Store)?;
            report.removed += 1;
        }
        (WorkItem::Delete(_), Err(e)) => {
            // The record stays, so the next pass retries the deletion.
            fail(report, local_id, kind, &e);
        }
        (WorkItem::Add(planned), Ok(file_id)) => {
            store
                .put(&synced_record(&planned, file_id, now))
                .await
                .map_err(SyncError::Store)?;
            report.added += 1;
        }
        (WorkItem::Add(planned), Err(e)) => {
            let record = FingerprintRecord {
                local_id: planned.note.local_id.clone(),
                content_hash: planned.content_hash.clone(),
                remote_file_id: None,
                sync_state: SyncState::Failed,
                title: planned.note.title.clone(),
                last_error: Some(e.to_string()),
                updated_at: now,
            };
            store.put(&record).await.map_err(SyncError::Store)?;
            fail(report, local_id, kind, &e);
        }
        (WorkItem::Update(update), Ok(file_id)) => {
            store
                .put(&synced_record(&update.planned, file_id, now))
                .await
                .map_err(SyncError::Store)?;
            report.updated += 1;
        }
        (WorkItem::Update(update), Err(e)) => {
            // Keep the old hash and handle so the next pass retries the full replace.
            let record = FingerprintRecord {
                sync_state: SyncState::Failed,
                last_error: Some(e.to_string()),
                updated_at: now,
                ..update.previous
            };
            store.put(&record).await.map_err(SyncError::Store)?;
            fail(report, local_id, kind, &e);
        }
    }

    Ok(())
}

fn synced_record(planned: &PlannedNote, file_id: Option<String>, now: i64) -> FingerprintRecord {
    FingerprintRecord {
        local_id: planned.note.local_id.clone(),
        content_hash: planned.content_hash.clone(),
        remote_file_id: file_id,
        sync_state: SyncState::Synced,
        title: planned.note.title.clone(),
        last_error: None,
        updated_at: now,
    }
}

fn fail(report: &mut SyncReport, local_id: String, kind: ChangeKind, err: &RemoteError) {
    warn!(local_id = %local_id, kind = %kind, error = %err, "sync item failed");
    report.failed += 1;
    report.failures.push(FailedItem {
        local_id,
        kind,
        reason: err.to_string(),
        permanent: !err.is_transient(),
    });
}
