//! Sync pass orchestration.
//!
//! Ties the pieces together: note source → planner → deletion guard →
//! executor. [`sync`] is the library entry point; [`run_sync`] is the
//! `nh sync` command wrapped around it.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::error::SyncError;
use crate::executor::{self, ApplyOptions};
use crate::migrate;
use crate::models::{ChangeSet, SyncReport};
use crate::planner::{self, DeletionGuard};
use crate::progress::{ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::remote::{OpenAIVectorStore, RemoteIndex, RemoteSession};
use crate::store::{FingerprintStore, SqliteFingerprintStore};
use crate::traits::{source_from_config, NoteSource};

/// Settings key holding the vector store created by `nh init`.
pub const VECTOR_STORE_SETTING: &str = "vector_store_id";

/// Knobs for one sync pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub apply: ApplyOptions,
    pub guard: DeletionGuard,
    /// Skip the deletion guard.
    pub allow_mass_delete: bool,
    /// Only consider the first `n` notes of the snapshot. Deletions are
    /// suppressed, since the rest of the corpus is missing on purpose.
    pub limit: Option<usize>,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            apply: ApplyOptions::from_config(&config.sync),
            guard: DeletionGuard {
                max_delete_fraction: config.sync.max_delete_fraction,
                min_tracked: config.sync.guard_min_tracked,
            },
            allow_mass_delete: false,
            limit: None,
        }
    }
}

/// Extract a snapshot and plan it against the store. No remote calls.
///
/// Fails with [`SyncError::SuspiciousSnapshot`] when the guard trips.
pub async fn prepare(
    source: &dyn NoteSource,
    store: &dyn FingerprintStore,
    options: &SyncOptions,
    progress: &dyn SyncProgressReporter,
) -> Result<ChangeSet, SyncError> {
    progress.report(SyncProgressEvent::Extracting);
    let mut snapshot = source.snapshot().await.map_err(SyncError::Provider)?;
    info!(source = source.name(), notes = snapshot.len(), "snapshot extracted");

    if let Some(limit) = options.limit {
        snapshot.truncate(limit);
    }

    let mut changes = planner::plan(snapshot, store).await?;

    if options.limit.is_some() && !changes.deletions.is_empty() {
        info!(
            skipped = changes.deletions.len(),
            "deletions skipped for a limited pass"
        );
        changes.deletions.clear();
    }

    if options.allow_mass_delete {
        if let Err(e) = planner::check_deletions(&changes, options.guard) {
            warn!(error = %e, "deletion guard overridden");
        }
    } else {
        planner::check_deletions(&changes, options.guard)?;
    }

    progress.report(SyncProgressEvent::Planned {
        additions: changes.additions.len() as u64,
        updates: changes.updates.len() as u64,
        deletions: changes.deletions.len() as u64,
        unchanged: changes.unchanged.len() as u64,
    });

    Ok(changes)
}

/// Run one full reconciliation pass.
///
/// Provider, store and guard failures abort before (or during) the pass and
/// come back as `Err`. Per-note remote failures land in the report.
pub async fn sync(
    source: &dyn NoteSource,
    backend: Arc<dyn RemoteIndex>,
    store: &dyn FingerprintStore,
    options: &SyncOptions,
    progress: &dyn SyncProgressReporter,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError> {
    let changes = prepare(source, store, options, progress).await?;
    if changes.is_noop() {
        info!(unchanged = changes.unchanged.len(), "nothing to sync");
    }
    executor::apply(changes, backend, store, options.apply, progress, cancel).await
}

/// Vector store from config, falling back to the one recorded by `nh init`.
pub async fn configured_vector_store(config: &Config, pool: &SqlitePool) -> Result<Option<String>> {
    if let Some(id) = &config.remote.vector_store_id {
        return Ok(Some(id.clone()));
    }
    migrate::get_setting(pool, VECTOR_STORE_SETTING).await
}

/// Build the remote index for `config`.
pub async fn open_backend(config: &Config, pool: &SqlitePool) -> Result<Arc<dyn RemoteIndex>> {
    let Some(vector_store_id) = configured_vector_store(config, pool).await? else {
        bail!(
            "No vector store configured. Set remote.vector_store_id or run \
             `nh init --create-vector-store`."
        );
    };
    let session = RemoteSession::from_config(&config.remote)?.with_vector_store(vector_store_id);
    Ok(Arc::new(OpenAIVectorStore::new(session)?))
}

/// `nh sync`: extract, plan and (unless `dry_run`) apply, then print a summary.
pub async fn run_sync(
    config: &Config,
    dry_run: bool,
    allow_mass_delete: bool,
    limit: Option<usize>,
    json: bool,
    progress_mode: ProgressMode,
) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = SqliteFingerprintStore::new(pool.clone());

    let source = source_from_config(config)?;
    let progress = progress_mode.reporter();
    let options = SyncOptions {
        allow_mass_delete,
        limit,
        ..SyncOptions::from_config(config)
    };

    if dry_run {
        let changes = prepare(source.as_ref(), &store, &options, progress.as_ref()).await?;
        print_plan(&changes, json)?;
        pool.close().await;
        return Ok(());
    }

    let backend = open_backend(config, &pool).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, on_signal).await {
            warn!("sync aborted with remote calls in flight");
            std::process::exit(130);
        }
    });

    let report = sync(
        source.as_ref(),
        backend,
        &store,
        &options,
        progress.as_ref(),
        &cancel,
    )
    .await?;

    print_report(&report, json)?;
    pool.close().await;
    Ok(())
}

/// First interrupt cancels `cancel` so the pass stops after the current
/// batch. Returns `true` if a second interrupt arrives, meaning the caller
/// should abort right away.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    cancel.cancel();
    eprintln!("Stopping after in-flight notes finish. Press Ctrl-C again to abort.");
    next_interrupt().await.is_ok()
}

fn print_plan(changes: &ChangeSet, json: bool) -> Result<()> {
    if json {
        let obj = serde_json::json!({
            "dry_run": true,
            "additions": changes.additions.len(),
            "updates": changes.updates.len(),
            "deletions": changes.deletions.len(),
            "unchanged": changes.unchanged.len(),
            "duplicates": changes.duplicates.len(),
            "tracked": changes.tracked,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!("sync (dry-run)");
    println!("  tracked: {}", changes.tracked);
    println!("  to add: {}", changes.additions.len());
    println!("  to update: {}", changes.updates.len());
    println!("  to remove: {}", changes.deletions.len());
    println!("  unchanged: {}", changes.unchanged.len());
    if !changes.duplicates.is_empty() {
        println!("  duplicates: {}", changes.duplicates.len());
    }
    for planned in &changes.additions {
        println!("  + {}  {}", planned.note.local_id, planned.note.title);
    }
    for update in &changes.updates {
        println!(
            "  ~ {}  {}",
            update.planned.note.local_id, update.planned.note.title
        );
    }
    for record in &changes.deletions {
        println!("  - {}  {}", record.local_id, record.title);
    }
    Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("sync");
    println!("  added: {}", report.added);
    println!("  updated: {}", report.updated);
    println!("  removed: {}", report.removed);
    println!("  unchanged: {}", report.unchanged);
    println!("  failed: {}", report.failed);
    if report.duplicates > 0 {
        println!("  duplicates: {}", report.duplicates);
    }
    for failure in &report.failures {
        println!(
            "  ! {} {} ({}): {}",
            failure.kind,
            failure.local_id,
            if failure.permanent { "permanent" } else { "transient" },
            failure.reason
        );
    }
    if report.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
    Ok(())
}
