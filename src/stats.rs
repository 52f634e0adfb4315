//! Fingerprint store summary.
//!
//! Shows how many notes are tracked, how they break down by sync state, and
//! which notes failed on their last pass (with the recorded reason). Used by
//! `nh status` to check that syncs are converging.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::ingest;
use crate::migrate;
use crate::models::{FingerprintRecord, SyncState};
use crate::store::{FingerprintStore, SqliteFingerprintStore};

/// Counts over the whole store.
#[derive(Debug, Default, Serialize)]
pub struct StoreSummary {
    pub tracked: u64,
    pub synced: u64,
    pub pending: u64,
    pub failed: u64,
    /// Records that never reached the remote index.
    pub without_remote_file: u64,
    /// Unix seconds of the most recent record write.
    pub last_write: Option<i64>,
    pub failures: Vec<FailedNote>,
}

#[derive(Debug, Serialize)]
pub struct FailedNote {
    pub local_id: String,
    pub title: String,
    pub error: String,
    pub updated_at: i64,
}

/// Summarize `store`.
pub async fn summarize(store: &dyn FingerprintStore) -> Result<StoreSummary> {
    let records = store.list().await?;
    Ok(summarize_records(&records))
}

fn summarize_records(records: &[FingerprintRecord]) -> StoreSummary {
    let mut summary = StoreSummary {
        tracked: records.len() as u64,
        ..StoreSummary::default()
    };

    for record in records {
        match record.sync_state {
            SyncState::Synced => summary.synced += 1,
            SyncState::Pending => summary.pending += 1,
            SyncState::Failed => {
                summary.failed += 1;
                summary.failures.push(FailedNote {
                    local_id: record.local_id.clone(),
                    title: record.title.clone(),
                    error: record.last_error.clone().unwrap_or_default(),
                    updated_at: record.updated_at,
                });
            }
        }
        if record.remote_file_id.is_none() {
            summary.without_remote_file += 1;
        }
        summary.last_write = summary.last_write.max(Some(record.updated_at));
    }

    // Most recent failures first
    summary
        .failures
        .sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.local_id.cmp(&b.local_id)));
    summary
}

/// Run the status command: read the store and print a summary.
pub async fn run_status(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let vector_store = ingest::configured_vector_store(config, &pool).await?;
    let store = SqliteFingerprintStore::new(pool.clone());
    let summary = summarize(&store).await?;
    pool.close().await;

    if json {
        let obj = serde_json::json!({
            "database": config.db.path.display().to_string(),
            "source": config.source.kind,
            "vector_store_id": vector_store,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Notes Harness: Status");
    println!("=====================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!("  Source:        {}", config.source.kind);
    println!(
        "  Vector store:  {}",
        vector_store.as_deref().unwrap_or("(not configured)")
    );
    println!();
    println!("  Tracked:       {}", summary.tracked);
    println!("  Synced:        {}", summary.synced);
    println!("  Failed:        {}", summary.failed);
    if summary.pending > 0 {
        println!("  Pending:       {}", summary.pending);
    }
    if summary.without_remote_file > 0 {
        println!("  Not uploaded:  {}", summary.without_remote_file);
    }
    println!(
        "  Last write:    {}",
        summary
            .last_write
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !summary.failures.is_empty() {
        println!();
        println!("  Failed notes:");
        println!("  {:<32} {:<16}   {}", "TITLE", "WHEN", "ERROR");
        println!("  {}", "-".repeat(76));
        for f in &summary.failures {
            let title = if f.title.is_empty() {
                f.local_id.as_str()
            } else {
                f.title.as_str()
            };
            println!(
                "  {:<32} {:<16}   {}",
                truncate_chars(title, 32),
                format_ts_relative(f.updated_at),
                f.error
            );
        }
    }

    println!();
    Ok(())
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 || delta >= 86400 * 30 {
        return chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| ts.to_string());
    }

    let (n, unit) = match delta {
        0..=59 => return "just now".to_string(),
        60..=3599 => (delta / 60, "min"),
        3600..=86399 => (delta / 3600, "hour"),
        _ => (delta / 86400, "day"),
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}
